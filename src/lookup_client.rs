use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

/// Why a single source lookup produced no value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The source endpoint is not configured; no request was made.
    #[error("source endpoint not configured")]
    NotConfigured,
    /// The request could not be sent or the body could not be read.
    #[error("transport error: {0}")]
    Transport(String),
    /// The source answered with something other than 200 OK.
    #[error("source returned status {0}")]
    Status(u16),
    /// The body is not a JSON object.
    #[error("malformed response body: {0}")]
    Decode(String),
    /// The body is a JSON object but lacks the expected typed field.
    #[error("unexpected response shape: {0}")]
    Schema(String),
    /// The caller cancelled the lookup.
    #[error("lookup cancelled")]
    Cancelled,
    /// The enrichment deadline or the per-request HTTP timeout elapsed
    /// before the source answered.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// The lookup task ended abnormally.
    #[error("lookup task failed: {0}")]
    TaskFailed(String),
}

/// HTTP transport settings shared by every source.
#[derive(Debug, Clone)]
pub struct LookupClientConfig {
    /// Upper bound on one request, independent of the enrichment deadline.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for LookupClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(2),
            pool_idle_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 5,
        }
    }
}

/// Client performing single-shot GET lookups against enrichment sources.
///
/// Cloning is cheap and shares the underlying connection pool.
#[derive(Clone)]
pub struct LookupClient {
    client: Client,
}

impl LookupClient {
    /// Creates a new `LookupClient` with its own connection pool.
    pub fn new(config: &LookupClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()?;

        Ok(Self { client })
    }

    /// Wraps an existing `reqwest::Client`.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Builds `<endpoint>?name=<escaped name>`, keeping any query the
    /// endpoint already carries.
    pub fn lookup_url(endpoint: &Url, name: &str) -> Url {
        let mut url = endpoint.clone();
        url.query_pairs_mut().append_pair("name", name);
        url
    }

    /// Performs one GET for `name` and decodes the body into `T`.
    ///
    /// There is no retry. Dropping the returned future aborts the request,
    /// which is how deadlines and cancellation reach the network.
    ///
    /// # Errors
    ///
    /// * [`FetchError::DeadlineExceeded`] if the client's request timeout fires.
    /// * [`FetchError::Transport`] if the request fails or the body cannot be read.
    /// * [`FetchError::Status`] for any status other than 200.
    /// * [`FetchError::Decode`] if the body is not a JSON object.
    /// * [`FetchError::Schema`] if the object does not match `T`.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &Url,
        name: &str,
    ) -> Result<T, FetchError> {
        let url = Self::lookup_url(endpoint, name);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(transport_error)?;

        decode_body(&body)
    }
}

fn transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::DeadlineExceeded
    } else {
        FetchError::Transport(err.to_string())
    }
}

/// Two-step decode: the body must be a JSON object, then it must match `T`.
pub(crate) fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, FetchError> {
    let object: Map<String, Value> =
        serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    serde_json::from_value(Value::Object(object)).map_err(|e| FetchError::Schema(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Body {
        age: f64,
    }

    #[test]
    fn test_client_creation() {
        assert!(LookupClient::new(&LookupClientConfig::default()).is_ok());
    }

    #[test]
    fn test_lookup_url_escapes_name() {
        let endpoint = Url::parse("https://api.agify.io/").unwrap();
        let url = LookupClient::lookup_url(&endpoint, "Jean Luc&x=1");
        assert_eq!(url.as_str(), "https://api.agify.io/?name=Jean+Luc%26x%3D1");
    }

    #[test]
    fn test_lookup_url_keeps_existing_query() {
        let endpoint = Url::parse("http://localhost:9000/age?country_id=RU").unwrap();
        let url = LookupClient::lookup_url(&endpoint, "Ivan");
        assert_eq!(url.query(), Some("country_id=RU&name=Ivan"));
    }

    #[test]
    fn test_decode_rejects_non_object() {
        let err = decode_body::<Body>(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));

        let err = decode_body::<Body>(b"not json").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn test_decode_schema_mismatch() {
        let err = decode_body::<Body>(br#"{"age": "old"}"#).unwrap_err();
        assert!(matches!(err, FetchError::Schema(_)));

        let body: Body = decode_body(br#"{"age": 42, "count": 10}"#).unwrap();
        assert_eq!(body.age, 42.0);
    }
}
