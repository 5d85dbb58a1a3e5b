use std::{fmt, future::Future, pin::Pin, sync::Arc};

use crate::Result;

/// Boxed future returned by [`TokenProvider::token`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Supplies a fresh access token for every outgoing request.
///
/// Implement this for token caches or refreshers. The returned value may be
/// a bare token or a full `Bearer <token>` value.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> TokenFuture<'_>;
}

impl<F, Fut> TokenProvider for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    fn token(&self) -> TokenFuture<'_> {
        Box::pin((self)())
    }
}

/// How requests are authorized.
#[derive(Clone)]
pub enum Credentials {
    /// Fixed `Authorization` header value.
    Bearer(String),
    /// Token obtained per request.
    Provider(Arc<dyn TokenProvider>),
}

impl Credentials {
    /// Builds static bearer credentials.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added automatically.
    pub fn bearer(token: impl AsRef<str>) -> Self {
        Self::Bearer(normalize_bearer_authorization(token.as_ref()))
    }

    pub fn provider<P: TokenProvider + 'static>(provider: P) -> Self {
        Self::Provider(Arc::new(provider))
    }

    /// Returns the `Authorization` header value for one request.
    pub(crate) async fn authorization(&self) -> Result<String> {
        match self {
            Self::Bearer(value) => Ok(value.clone()),
            Self::Provider(provider) => {
                let token = provider.token().await?;
                Ok(normalize_bearer_authorization(&token))
            }
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"<redacted>").finish(),
            Self::Provider(_) => f.debug_tuple("Provider").field(&"<dyn TokenProvider>").finish(),
        }
    }
}

pub(crate) fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
