use std::{fmt, sync::Arc, time::Duration};

use chrono::DateTime;
#[cfg(not(target_arch = "wasm32"))]
use chrono::Utc;
use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Method, StatusCode,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use url::Url;

use crate::{
    wire::{self, ApiErrorBody},
    ClientOptions, Credentials, Entity, IdmError, Page, Params, PathTemplate, Result, Value,
};

/// One fully resolved HTTP request.
///
/// Built from a [`Resource`] and call parameters; never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the client base URL, placeholders already filled.
    pub path: String,
    /// Serialized query pairs in parameter order.
    pub query: Vec<(String, String)>,
    pub body: Option<JsonValue>,
}

/// Raw HTTP response as read off the wire.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub headers: HeaderMap,
    pub body: String,
}

/// Connection state shared by every resource of one client.
pub(crate) struct Transport {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    headers: HeaderMap,
    timeout: Duration,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Transport {
    pub(crate) fn new(
        base_url: &str,
        credentials: Credentials,
        options: &ClientOptions,
    ) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: validate_base_url(base_url)?,
            credentials,
            headers: build_headers(&options.headers)?,
            timeout: Duration::from_millis(options.timeout_ms),
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, request: &RequestDescriptor) -> Result<Url> {
        let path = request.path.trim_start_matches('/');
        let joined = if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        };
        let mut url = Url::parse(&joined)
            .map_err(|err| IdmError::Argument(format!("invalid request url: {err}")))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }

    /// Sends one request. Exactly one network round trip; non-2xx statuses
    /// are turned into [`IdmError::Api`].
    pub(crate) async fn dispatch(&self, request: &RequestDescriptor) -> Result<RawResponse> {
        let url = self.url_for(request)?;
        let authorization = self.credentials.authorization().await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(method = %request.method, path = %request.path, "sending request");

        // On WASM, reqwest uses AbortController for timeout; the `.timeout()`
        // method is available on both targets.
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(header::AUTHORIZATION, authorization)
            .header(header::ACCEPT, "application/json")
            .headers(self.headers.clone())
            .timeout(self.timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(IdmError::Transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(IdmError::Transport)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(status = status.as_u16(), path = %request.path, "received response");

        if !status.is_success() {
            return Err(api_error(status, &headers, &body));
        }

        Ok(RawResponse { headers, body })
    }
}

/// Generic client for one templated REST resource.
///
/// Each operation resolves the path template, serializes the remaining
/// parameters into the query string and issues a single HTTP request.
/// Wrap it in a [`crate::RetryResource`] for retries.
#[derive(Clone, Debug)]
pub struct Resource {
    transport: Arc<Transport>,
    template: PathTemplate,
    repeat_params: bool,
    items_key: Option<String>,
    cursor_param: String,
}

impl Resource {
    pub(crate) fn new(transport: Arc<Transport>, template: impl Into<PathTemplate>) -> Self {
        Self {
            transport,
            template: template.into(),
            repeat_params: false,
            items_key: None,
            cursor_param: "from".to_owned(),
        }
    }

    /// Array-valued query parameters are sent as repeated keys
    /// (`k=a&k=b`) instead of one comma-joined value (`k=a,b`).
    pub fn with_repeat_params(mut self, repeat_params: bool) -> Self {
        self.repeat_params = repeat_params;
        self
    }

    /// Field holding the items in paginated envelope responses.
    pub fn with_items_key(mut self, key: impl Into<String>) -> Self {
        self.items_key = Some(key.into());
        self
    }

    /// Query parameter used to send a cursor back. Defaults to `from`.
    pub fn with_cursor_param(mut self, name: impl Into<String>) -> Self {
        self.cursor_param = name.into();
        self
    }

    /// Marks a placeholder of the path template as mandatory.
    pub fn require(mut self, name: &str) -> Self {
        self.template = self.template.require(name);
        self
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    /// Builds the request for `method` without sending it.
    pub fn describe(
        &self,
        method: Method,
        mut params: Params,
        body: Option<JsonValue>,
    ) -> Result<RequestDescriptor> {
        let path = self.template.resolve(&mut params)?;
        Ok(RequestDescriptor {
            method,
            path,
            query: serialize_query(&params, self.repeat_params),
            body,
        })
    }

    /// `POST` with a JSON body.
    pub async fn create<B>(&self, params: Params, data: &B) -> Result<Entity>
    where
        B: Serialize + ?Sized,
    {
        let request = self.describe(Method::POST, params, Some(to_body(data)?))?;
        self.fetch_entity(&request).await
    }

    /// `GET` a single entity.
    pub async fn get(&self, params: Params) -> Result<Entity> {
        let request = self.describe(Method::GET, params, None)?;
        self.fetch_entity(&request).await
    }

    /// `GET` a list, decoded into a [`Page`].
    pub async fn get_all(&self, params: Params) -> Result<Page> {
        let request = self.describe(Method::GET, params, None)?;
        let response = self.transport.dispatch(&request).await?;
        let body = wire::decode_entity(&response.body)?;
        let mut page = wire::decode_page(body, self.items_key.as_deref())?;

        if page.next_cursor.is_none() {
            page.next_cursor = self.cursor_from_link(&response.headers);
        }
        Ok(page)
    }

    /// Fetches the page following `cursor`; the cursor is the only parameter.
    pub async fn get_next(&self, cursor: &str) -> Result<Page> {
        if cursor.is_empty() {
            return Err(IdmError::Argument("cursor cannot be empty".to_owned()));
        }
        self.get_all(Params::new().with(self.cursor_param.as_str(), cursor))
            .await
    }

    /// `PATCH` with a JSON body.
    pub async fn update<B>(&self, params: Params, data: &B) -> Result<Entity>
    where
        B: Serialize + ?Sized,
    {
        let request = self.describe(Method::PATCH, params, Some(to_body(data)?))?;
        self.fetch_entity(&request).await
    }

    /// `PUT` with a JSON body.
    pub async fn replace<B>(&self, params: Params, data: &B) -> Result<Entity>
    where
        B: Serialize + ?Sized,
    {
        let request = self.describe(Method::PUT, params, Some(to_body(data)?))?;
        self.fetch_entity(&request).await
    }

    pub async fn delete(&self, params: Params) -> Result<()> {
        let request = self.describe(Method::DELETE, params, None)?;
        self.transport.dispatch(&request).await?;
        Ok(())
    }

    /// `DELETE` carrying a JSON body, for endpoints that remove several
    /// links at once.
    pub async fn delete_with_body<B>(&self, params: Params, data: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let request = self.describe(Method::DELETE, params, Some(to_body(data)?))?;
        self.transport.dispatch(&request).await?;
        Ok(())
    }

    async fn fetch_entity(&self, request: &RequestDescriptor) -> Result<Entity> {
        let response = self.transport.dispatch(request).await?;
        wire::decode_entity(&response.body)
    }

    fn cursor_from_link(&self, headers: &HeaderMap) -> Option<String> {
        let link = headers.get(header::LINK)?.to_str().ok()?;
        let target = wire::next_link(link)?;
        // Relative targets resolve against the base URL.
        let url = Url::parse(target)
            .or_else(|_| Url::parse(self.transport.base_url())?.join(target))
            .ok()?;
        url.query_pairs()
            .find(|(key, _)| *key == self.cursor_param.as_str())
            .map(|(_, value)| value.into_owned())
    }
}

pub(crate) fn to_body<B: Serialize + ?Sized>(data: &B) -> Result<JsonValue> {
    serde_json::to_value(data)
        .map_err(|err| IdmError::Argument(format!("request body is not serializable: {err}")))
}

/// Serializes residual parameters into query pairs.
pub(crate) fn serialize_query(params: &Params, repeat_params: bool) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (name, value) in params.iter() {
        match value {
            Value::List(values) if values.is_empty() => {}
            Value::List(values) if repeat_params => {
                pairs.extend(values.iter().map(|item| (name.to_owned(), item.clone())));
            }
            other => pairs.push((name.to_owned(), other.render())),
        }
    }
    pairs
}

fn validate_base_url(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(IdmError::Argument("base url cannot be empty".to_owned()));
    }
    let parsed = Url::parse(trimmed)
        .map_err(|err| IdmError::Argument(format!("invalid base url '{trimmed}': {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(IdmError::Argument(format!(
            "base url must use http or https, got '{}'",
            parsed.scheme()
        )));
    }
    Ok(trimmed.to_owned())
}

fn build_headers(pairs: &[(String, String)]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| IdmError::Argument(format!("invalid header name '{name}'")))?;
        if header_name == header::AUTHORIZATION {
            return Err(IdmError::Argument(
                "authorization comes from the client credentials, not extra headers".to_owned(),
            ));
        }
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| IdmError::Argument(format!("invalid value for header '{name}'")))?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

fn api_error(status: StatusCode, headers: &HeaderMap, body: &str) -> IdmError {
    let parsed = ApiErrorBody::parse(body);
    let message = parsed
        .message
        .filter(|message| !message.is_empty())
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_owned()))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_owned()
        });

    IdmError::Api {
        status: status.as_u16(),
        error: parsed.error,
        error_code: parsed.error_code,
        message,
        retry_after: retry_after(headers),
    }
}

/// Server wait hint: `Retry-After` as delta seconds or an HTTP-date, else
/// an `x-ratelimit-reset` epoch timestamp. Hints that are already due
/// yield `None` so the computed backoff applies.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header_text = |name: &str| -> Option<&str> {
        headers
            .get(name)?
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let hint = match header_text("retry-after") {
        Some(value) => match value.parse::<u64>() {
            Ok(secs) => Some(Duration::from_secs(secs)),
            Err(_) => DateTime::parse_from_rfc2822(value)
                .ok()
                .and_then(|at| until_epoch_secs(at.timestamp())),
        },
        None => header_text("x-ratelimit-reset")
            .and_then(|value| value.parse::<i64>().ok())
            .and_then(until_epoch_secs),
    };
    hint.filter(|delay| !delay.is_zero())
}

/// Time left until an absolute epoch timestamp in seconds.
#[cfg(not(target_arch = "wasm32"))]
fn until_epoch_secs(at: i64) -> Option<Duration> {
    let left = at.saturating_sub(Utc::now().timestamp());
    Some(Duration::from_secs(u64::try_from(left).unwrap_or(0)))
}

// The system clock panics on wasm32-unknown-unknown.
#[cfg(target_arch = "wasm32")]
fn until_epoch_secs(_at: i64) -> Option<Duration> {
    None
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use reqwest::{header::HeaderMap, Method, StatusCode};
    use serde_json::json;

    use chrono::Utc;

    use super::{api_error, retry_after, serialize_query, Resource, Transport};
    use crate::{ClientOptions, Credentials, IdmError, Params, Value};

    fn resource(template: &str) -> Resource {
        let transport = Transport::new(
            "https://api.example.com/api/v2/",
            Credentials::bearer("token"),
            &ClientOptions::default(),
        )
        .expect("transport must build");
        Resource::new(Arc::new(transport), template)
    }

    #[test]
    fn repeated_keys_when_repeat_params() {
        let params = Params::new()
            .with("strategy", Value::list(["auth0", "samlp"]))
            .with("per_page", 10);
        assert_eq!(
            serialize_query(&params, true),
            vec![
                ("strategy".to_owned(), "auth0".to_owned()),
                ("strategy".to_owned(), "samlp".to_owned()),
                ("per_page".to_owned(), "10".to_owned()),
            ]
        );
    }

    #[test]
    fn comma_joined_without_repeat_params() {
        let params = Params::new()
            .with("fields", Value::list(["email", "user_id"]))
            .with("include_totals", true)
            .with("empty", Value::list(Vec::<String>::new()));
        assert_eq!(
            serialize_query(&params, false),
            vec![
                ("fields".to_owned(), "email,user_id".to_owned()),
                ("include_totals".to_owned(), "true".to_owned()),
            ]
        );
    }

    #[test]
    fn describe_moves_placeholders_out_of_query() {
        let request = resource("/users/:id")
            .describe(
                Method::GET,
                Params::new().with("id", "u1").with("fields", "email"),
                None,
            )
            .expect("must describe");
        assert_eq!(request.path, "/users/u1");
        assert_eq!(request.query, vec![("fields".to_owned(), "email".to_owned())]);
        assert!(request.body.is_none());
    }

    #[test]
    fn describe_is_deterministic() {
        let resource = resource("/roles/:id/users").with_repeat_params(true);
        let params = Params::new().with("id", "r1").with("take", 5);
        let first = resource
            .describe(Method::GET, params.clone(), Some(json!({"a": 1})))
            .unwrap();
        let second = resource
            .describe(Method::GET, params, Some(json!({"a": 1})))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn required_placeholder_fails_before_dispatch() {
        let err = resource("/users/:id")
            .require("id")
            .describe(Method::DELETE, Params::new(), None)
            .unwrap_err();
        assert!(err.is_argument());
    }

    #[test]
    fn base_url_is_validated() {
        let options = ClientOptions::default();
        for bad in ["", "   ", "not a url", "ftp://api.example.com"] {
            let err = Transport::new(bad, Credentials::bearer("t"), &options).unwrap_err();
            assert!(matches!(err, IdmError::Argument(_)), "{bad:?}");
        }
        let ok = Transport::new("https://api.example.com///", Credentials::bearer("t"), &options)
            .unwrap();
        assert_eq!(ok.base_url(), "https://api.example.com");
    }

    #[test]
    fn invalid_header_is_rejected() {
        let options = ClientOptions::default().with_header("bad header", "x");
        let err = Transport::new("https://api.example.com", Credentials::bearer("t"), &options)
            .unwrap_err();
        assert!(matches!(err, IdmError::Argument(_)));
    }

    #[test]
    fn authorization_cannot_be_overridden_by_headers() {
        let options = ClientOptions::default().with_header("Authorization", "Bearer other");
        let err = Transport::new("https://api.example.com", Credentials::bearer("t"), &options)
            .unwrap_err();
        assert!(matches!(err, IdmError::Argument(_)));
    }

    #[test]
    fn url_joins_relative_and_absolute_templates() {
        for template in ["/users/:id", "users/:id"] {
            let resource = resource(template);
            let request = resource
                .describe(Method::GET, Params::new().with("id", "u1"), None)
                .unwrap();
            let url = resource.transport.url_for(&request).unwrap();
            assert_eq!(url.as_str(), "https://api.example.com/api/v2/users/u1", "{template}");
        }

        let root = resource("/");
        let request = root.describe(Method::GET, Params::new(), None).unwrap();
        assert_eq!(
            root.transport.url_for(&request).unwrap().as_str(),
            "https://api.example.com/api/v2"
        );
    }

    #[test]
    fn link_cursor_accepts_relative_targets() {
        let logs = resource("/logs");
        let mut headers = HeaderMap::new();
        headers.insert(
            "link",
            r#"</api/v2/logs?from=90001&take=1>; rel="next""#.parse().unwrap(),
        );
        assert_eq!(logs.cursor_from_link(&headers).as_deref(), Some("90001"));

        headers.insert(
            "link",
            r#"<https://api.example.com/api/v2/logs?from=7>; rel="next""#.parse().unwrap(),
        );
        assert_eq!(logs.cursor_from_link(&headers).as_deref(), Some("7"));
    }

    #[test]
    fn api_error_prefers_body_message() {
        let err = api_error(
            StatusCode::NOT_FOUND,
            &HeaderMap::new(),
            r#"{"statusCode":404,"error":"Not Found","message":"The role does not exist."}"#,
        );
        match err {
            IdmError::Api {
                status,
                error,
                message,
                ..
            } => {
                assert_eq!(status, 404);
                assert_eq!(error.as_deref(), Some("Not Found"));
                assert_eq!(message, "The role does not exist.");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn api_error_falls_back_to_reason_phrase() {
        let err = api_error(StatusCode::SERVICE_UNAVAILABLE, &HeaderMap::new(), "");
        assert_eq!(err.to_string(), "api error 503: Service Unavailable");
    }

    #[test]
    fn api_error_reads_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", "2".parse().unwrap());
        let err = api_error(StatusCode::TOO_MANY_REQUESTS, &headers, "{}");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn due_hints_fall_back_to_backoff() {
        for (name, value) in [
            ("retry-after", "0"),
            ("retry-after", "Sun, 06 Nov 1994 08:49:37 GMT"),
            ("x-ratelimit-reset", "1"),
        ] {
            let mut headers = HeaderMap::new();
            headers.insert(name, value.parse().unwrap());
            assert_eq!(retry_after(&headers), None, "{name}: {value}");
        }
    }

    #[test]
    fn retry_after_accepts_http_dates() {
        let at = Utc::now() + chrono::Duration::seconds(120);
        let mut headers = HeaderMap::new();
        headers.insert(
            "retry-after",
            at.format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string()
                .parse()
                .unwrap(),
        );
        let delay = retry_after(&headers).expect("future date is a hint");
        assert!(delay > Duration::from_secs(100));
        assert!(delay <= Duration::from_secs(120));
    }
}
