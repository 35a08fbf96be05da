use std::path::{Path, PathBuf};

/// Client credentials presented to the authorization server.
///
/// The certificate and private key authenticate the TLS connection itself;
/// the client id identifies the principal in the `client_credentials` grant.
/// No bearer token is involved at this stage.
///
/// Credentials are immutable once constructed. All three fields are
/// guaranteed to be non-empty.
///
/// # Examples
///
/// ```
/// use warden_common::Credentials;
///
/// let creds = Credentials::new("/etc/warden/client.pem", "/etc/warden/client.key", "svc-a")?;
/// assert_eq!(creds.client_id(), "svc-a");
///
/// assert!(Credentials::new("", "/etc/warden/client.key", "svc-a").is_err());
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    certificate_path: PathBuf,
    private_key_path: PathBuf,
    client_id: String,
}

impl Credentials {
    /// Creates a new set of credentials.
    ///
    /// # Arguments
    ///
    /// * `certificate_path` - PEM-encoded client certificate
    /// * `private_key_path` - PEM-encoded private key matching the certificate
    /// * `client_id` - OAuth2 client identifier
    ///
    /// # Errors
    ///
    /// Returns an error naming the first empty (or whitespace-only) field.
    pub fn new(
        certificate_path: impl Into<PathBuf>,
        private_key_path: impl Into<PathBuf>,
        client_id: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let certificate_path = certificate_path.into();
        let private_key_path = private_key_path.into();
        let client_id = client_id.into();

        if is_blank_path(&certificate_path) {
            anyhow::bail!("certificate_path must not be empty");
        }
        if is_blank_path(&private_key_path) {
            anyhow::bail!("private_key_path must not be empty");
        }
        if client_id.trim().is_empty() {
            anyhow::bail!("client_id must not be empty");
        }

        Ok(Self {
            certificate_path,
            private_key_path,
            client_id,
        })
    }

    /// Path to the PEM-encoded client certificate.
    #[must_use]
    pub fn certificate_path(&self) -> &Path {
        &self.certificate_path
    }

    /// Path to the PEM-encoded private key.
    #[must_use]
    pub fn private_key_path(&self) -> &Path {
        &self.private_key_path
    }

    /// The OAuth2 client identifier.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

fn is_blank_path(path: &Path) -> bool {
    path.to_str()
        .map_or_else(|| path.as_os_str().is_empty(), |s| s.trim().is_empty())
}
