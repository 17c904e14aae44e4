/// Errors surfaced by the Rijkscloud API client.
///
/// Every HTTP-level failure (connection, timeout, non-2xx status, payload
/// that does not decode) maps onto a variant here. The client never
/// retries; retry and backoff policy belong to whoever scheduled the call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("rijkscloud transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{method} {endpoint} returned {status}: {body}")]
    Status {
        method: &'static str,
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("missing key '{key}' in response from {endpoint}")]
    MissingKey {
        endpoint: String,
        key: &'static str,
    },

    #[error("malformed payload from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}
