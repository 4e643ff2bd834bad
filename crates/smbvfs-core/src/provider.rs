//! The SMB resource provider.
//!
//! One provider exists per registered scheme. It owns everything its resources
//! share: the scheme's [`PathCodec`], the client configuration and base
//! [`AuthContext`], the [`ResourceLockService`], and the protocol client.
//! Cloning a provider yields another handle to the same instance.

use std::sync::Arc;

use tracing::{debug, info, instrument};
use url::Url;

use crate::client::{RemoteHandle, SmbClient};
use crate::config::{
    self, ClientConfig, ConfigError, DEFAULT_SCHEME, PORT_OVERRIDE_ENV, ProviderArguments,
};
use crate::context::AuthContext;
use crate::credential::Credential;
use crate::error::ResourceError;
use crate::locks::{ResourceLockGuard, ResourceLockService};
use crate::path::PathCodec;
use crate::resource::{Resource, ResourceProvider, SmbResource};

#[derive(Debug)]
struct ProviderInner {
    scheme: String,
    arguments: ProviderArguments,
    codec: PathCodec,
    base_context: AuthContext,
    locks: Arc<ResourceLockService>,
    client: Arc<dyn SmbClient>,
}

/// Per-scheme factory for [`SmbResource`]s.
#[derive(Debug, Clone)]
pub struct SmbResourceProvider {
    inner: Arc<ProviderInner>,
}

impl SmbResourceProvider {
    /// Build a provider, honouring the [`PORT_OVERRIDE_ENV`] port override.
    ///
    /// An empty `scheme` selects [`DEFAULT_SCHEME`].
    pub fn new(
        scheme: &str,
        arguments: ProviderArguments,
        client: Arc<dyn SmbClient>,
    ) -> Result<Self, ConfigError> {
        let port_override = std::env::var(PORT_OVERRIDE_ENV).ok();
        Self::with_port_override(scheme, arguments, client, port_override.as_deref())
    }

    /// Build a provider with an explicit port override instead of reading the environment.
    #[instrument(level = "info", skip(arguments, client), fields(scheme = %scheme))]
    pub fn with_port_override(
        scheme: &str,
        arguments: ProviderArguments,
        client: Arc<dyn SmbClient>,
        port_override: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let scheme = if scheme.is_empty() {
            DEFAULT_SCHEME
        } else {
            scheme
        };
        let codec = PathCodec::new(scheme).map_err(|source| ConfigError::InvalidScheme {
            scheme: scheme.to_string(),
            source,
        })?;
        let client_config =
            ClientConfig::from_arguments(&arguments)?.with_port_override(port_override)?;
        let lock_timeout = config::lock_timeout(&arguments);

        info!(
            resolve_order = %client_config.resolve_order,
            dfs_disabled = client_config.dfs_disabled,
            port = ?client_config.port,
            lock_timeout_ms = lock_timeout.as_millis(),
            "Initializing SMB resource provider"
        );

        Ok(Self {
            inner: Arc::new(ProviderInner {
                scheme: scheme.to_string(),
                arguments,
                codec,
                base_context: AuthContext::new(client_config),
                locks: Arc::new(ResourceLockService::new(lock_timeout)),
                client,
            }),
        })
    }

    pub fn codec(&self) -> &PathCodec {
        &self.inner.codec
    }

    pub fn client_config(&self) -> &ClientConfig {
        self.inner.base_context.config()
    }

    /// Context used when no credential is supplied.
    pub fn base_context(&self) -> &AuthContext {
        &self.inner.base_context
    }

    pub fn lock_service(&self) -> &Arc<ResourceLockService> {
        &self.inner.locks
    }

    /// Whether `self` and `other` are handles to the same provider instance.
    pub fn same_instance(&self, other: &SmbResourceProvider) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Context for a call with `credential`, derived from the base context.
    pub fn context_for(&self, credential: Option<&Credential>) -> AuthContext {
        match credential {
            Some(credential) => self.inner.base_context.with_credentials(credential),
            None => self.inner.base_context.clone(),
        }
    }

    /// Bind a qualified, credential-free `path` to a remote handle.
    ///
    /// `None` when the path is not a valid URL or the client can't resolve it.
    pub fn get_file(
        &self,
        path: &str,
        credential: Option<&Credential>,
    ) -> Option<Arc<dyn RemoteHandle>> {
        let url = match Url::parse(path) {
            Ok(url) => url,
            Err(e) => {
                debug!(path = %path, error = %e, "Malformed SMB path");
                return None;
            }
        };
        match self.inner.client.resolve(&url, &self.context_for(credential)) {
            Ok(handle) => Some(handle),
            Err(e) => {
                debug!(path = %path, error = %e, "Failed to resolve SMB path");
                None
            }
        }
    }

    /// Resource for `path`, taking the credential embedded in the path.
    pub fn smb_resource(&self, path: &str) -> SmbResource {
        SmbResource::new(self.clone(), path)
    }

    /// Resource for `path` authenticating as `credential`.
    pub fn smb_resource_with_credential(
        &self,
        path: &str,
        credential: Option<Credential>,
    ) -> SmbResource {
        SmbResource::with_credential(self.clone(), path, credential)
    }
}

impl ResourceProvider for SmbResourceProvider {
    fn scheme(&self) -> &str {
        &self.inner.scheme
    }

    fn arguments(&self) -> &ProviderArguments {
        &self.inner.arguments
    }

    fn resource(&self, path: &str) -> Box<dyn Resource> {
        Box::new(self.smb_resource(path))
    }

    fn is_case_sensitive(&self) -> bool {
        false
    }

    fn is_mode_supported(&self) -> bool {
        false
    }

    fn is_attributes_supported(&self) -> bool {
        true
    }

    fn lock(&self, resource: &dyn Resource) -> Result<ResourceLockGuard, ResourceError> {
        self.inner.locks.lock(&resource.identity())
    }
}
