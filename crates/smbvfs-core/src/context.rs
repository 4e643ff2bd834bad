//! Authentication contexts handed to the protocol client.

use std::sync::Arc;

use crate::config::ClientConfig;
use crate::credential::Credential;

/// Client configuration plus the identity a remote call authenticates as.
///
/// The provider owns one base context with no credential (the default
/// identity). Per-call contexts are derived from it with
/// [`AuthContext::with_credentials`], which never touches the base.
#[derive(Debug, Clone)]
pub struct AuthContext {
    config: Arc<ClientConfig>,
    credential: Option<Credential>,
}

impl AuthContext {
    /// Base context for `config`.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
            credential: None,
        }
    }

    /// Derive a context that authenticates as `credential`.
    ///
    /// The derived context shares the configuration. An anonymous credential
    /// yields a plain copy of `self`.
    #[must_use]
    pub fn with_credentials(&self, credential: &Credential) -> Self {
        if credential.is_anonymous() {
            return self.clone();
        }
        Self {
            config: Arc::clone(&self.config),
            credential: Some(credential.clone()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `None` for the default identity.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn username(&self) -> Option<&str> {
        self.credential.as_ref().and_then(Credential::username)
    }

    /// Whether both contexts share one configuration allocation.
    pub fn shares_config(&self, other: &AuthContext) -> bool {
        Arc::ptr_eq(&self.config, &other.config)
    }
}
