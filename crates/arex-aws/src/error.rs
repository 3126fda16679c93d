/// Errors that can occur when talking to AWS APIs.
///
/// # Examples
///
/// ```rust
/// use arex_aws::error::AwsError;
///
/// let err = AwsError::MissingCredentials { var: "AWS_ACCESS_KEY_ID" };
/// assert!(err.to_string().contains("AWS_ACCESS_KEY_ID"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum AwsError {
    /// A required credential environment variable is absent.
    #[error("Missing AWS credentials: environment variable {var} is not set")]
    MissingCredentials { var: &'static str },

    /// HTTP-level error: non-2xx status code from an AWS endpoint.
    #[error("{service} API HTTP error: status={status}, body={body}")]
    Http {
        service: String,
        status: u16,
        body: String,
    },

    /// An underlying HTTP transport error from `reqwest`.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// An XML response body could not be decoded.
    #[error("{service} XML decode error: {source}")]
    Xml {
        service: String,
        #[source]
        source: quick_xml::DeError,
    },

    /// JSON serialization or deserialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HMAC signing failed (invalid key length or algorithm mismatch).
    #[error("HMAC signing error: {0}")]
    Hmac(String),

    /// Metric construction failed while building a snapshot.
    #[error("Metric error: {0}")]
    Metric(#[from] prometheus::Error),

    /// A fetch was requested for a region no client was built for.
    #[error("No client configured for region '{0}'")]
    UnknownRegion(String),
}

/// Convenience type alias so callers can write `error::Result<T>`.
pub type Result<T> = std::result::Result<T, AwsError>;
