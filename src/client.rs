use std::{fmt, sync::Arc};

use crate::{
    managers::{ConnectionsManager, RolesManager, UsersManager},
    resource::Transport,
    ClientOptions, Credentials, IdmError, PathTemplate, Resource, Result, RetryResource,
    TokenProvider,
};

/// Formats a tenant domain into the canonical management API base URL.
///
/// Example: `"acme.eu.example.com"` → `"https://acme.eu.example.com/api/v2"`
pub fn domain_to_base_url(domain: &str) -> String {
    let host = domain.trim().trim_end_matches('/');
    let host = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host);
    format!("https://{host}/api/v2")
}

#[derive(Clone)]
/// Entry point to the management API.
///
/// Holds the immutable configuration (base URL, credentials, options) and
/// hands out resources and managers that share one connection pool.
pub struct ManagementClient {
    transport: Arc<Transport>,
    credentials: Credentials,
    options: ClientOptions,
}

impl fmt::Debug for ManagementClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagementClient")
            .field("base_url", &self.transport.base_url())
            .field("credentials", &self.credentials)
            .field("options", &self.options)
            .finish()
    }
}

impl ManagementClient {
    /// Creates a client from a base URL and a static access token.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added automatically.
    pub fn new(base_url: impl AsRef<str>, token: impl AsRef<str>) -> Result<Self> {
        if token.as_ref().trim().is_empty() {
            return Err(IdmError::Argument("access token cannot be empty".to_owned()));
        }
        Self::with_credentials(base_url, Credentials::bearer(token))
    }

    /// Creates a client that asks `provider` for a token on every request.
    pub fn with_token_provider<P>(base_url: impl AsRef<str>, provider: P) -> Result<Self>
    where
        P: TokenProvider + 'static,
    {
        Self::with_credentials(base_url, Credentials::provider(provider))
    }

    /// Creates a client with explicit credentials and default options.
    pub fn with_credentials(base_url: impl AsRef<str>, credentials: Credentials) -> Result<Self> {
        let options = ClientOptions::default();
        let transport = Transport::new(base_url.as_ref(), credentials.clone(), &options)?;
        Ok(Self {
            transport: Arc::new(transport),
            credentials,
            options,
        })
    }

    /// Creates a client from a **tenant domain** and a bearer token.
    ///
    /// The base URL is derived automatically: `https://<domain>/api/v2`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use idm_rest::ManagementClient;
    ///
    /// let client = ManagementClient::from_domain("acme.example.com", "my-token")?;
    /// # Ok::<(), idm_rest::IdmError>(())
    /// ```
    pub fn from_domain(domain: impl AsRef<str>, token: impl AsRef<str>) -> Result<Self> {
        let domain = domain.as_ref();
        if domain.trim().is_empty() {
            return Err(IdmError::Argument("domain cannot be empty".to_owned()));
        }
        Self::new(domain_to_base_url(domain), token)
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `IDM_BASE_URL` — full API base URL, or
    /// - `IDM_DOMAIN` — tenant domain, used when `IDM_BASE_URL` is unset
    /// - `IDM_TOKEN` — access token (Bearer prefix optional)
    ///
    /// **Not available on `wasm32` targets** — environment variables do not
    /// exist in browser runtimes.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use idm_rest::ManagementClient;
    ///
    /// let client = ManagementClient::from_env().expect("missing IDM_* env vars");
    /// ```
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Result<Self> {
        let token = non_empty_env("IDM_TOKEN")?;
        match non_empty_env("IDM_BASE_URL") {
            Ok(base_url) => Self::new(base_url, token),
            Err(_) => {
                let domain = non_empty_env("IDM_DOMAIN").map_err(|_| {
                    IdmError::Argument(
                        "missing IDM_BASE_URL or IDM_DOMAIN environment variable".to_owned(),
                    )
                })?;
                Self::from_domain(domain, token)
            }
        }
    }

    /// Applies client options such as timeout, headers and retry behavior.
    pub fn with_options(self, options: ClientOptions) -> Result<Self> {
        let transport =
            Transport::new(self.transport.base_url(), self.credentials.clone(), &options)?;
        Ok(Self {
            transport: Arc::new(transport),
            credentials: self.credentials,
            options,
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Generic single-attempt resource for `template`.
    pub fn resource(&self, template: impl Into<PathTemplate>) -> Resource {
        Resource::new(self.transport.clone(), template)
    }

    /// Wraps `resource` in the client's retry policy.
    pub fn retrying(&self, resource: Resource) -> RetryResource {
        RetryResource::new(resource, self.options.retry.clone())
    }

    pub fn users(&self) -> UsersManager {
        UsersManager::new(self)
    }

    pub fn roles(&self) -> RolesManager {
        RolesManager::new(self)
    }

    pub fn connections(&self) -> ConnectionsManager {
        ConnectionsManager::new(self)
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn non_empty_env(name: &str) -> Result<String> {
    let value = std::env::var(name)
        .map_err(|_| IdmError::Argument(format!("missing {name} environment variable")))?;
    if value.trim().is_empty() {
        return Err(IdmError::Argument(format!("{name} is set but empty")));
    }
    Ok(value)
}
