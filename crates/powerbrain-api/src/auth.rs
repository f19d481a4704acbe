use secrecy::{ExposeSecret, SecretString};

/// HTTP basic-auth credentials for the appliance's admin pages.
///
/// The appliance treats an empty username as "no authentication", so
/// [`BasicAuth::from_parts`] returns `None` in that case and requests go
/// out without an `Authorization` header.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    username: String,
    password: SecretString,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// Build credentials, or `None` when the username is empty.
    pub fn from_parts(username: &str, password: SecretString) -> Option<Self> {
        if username.is_empty() {
            None
        } else {
            Some(Self::new(username, password))
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Attach the credentials to a request.
    pub(crate) fn apply(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.basic_auth(&self.username, Some(self.password.expose_secret()))
    }
}
