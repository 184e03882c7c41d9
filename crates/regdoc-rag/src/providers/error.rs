//! Provider failures, classified once at the adapter boundary

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

/// Tagged failure of an embedding or LLM provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Throttled (HTTP 429)
    #[error("Provider rate limited: {0}")]
    RateLimited(String),

    /// Cold start, overload or timeout (HTTP 503)
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Credentials rejected (HTTP 401)
    #[error("Provider rejected credentials: {0}")]
    Unauthorized(String),

    /// Anything else, with the originating error kind for diagnosis
    #[error("Provider error ({kind}): {message}")]
    Unknown { kind: String, message: String },
}

fn rate_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    // "rate" or "rates" as a word: "generate" and "accurate" are not throttling
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)\brates?\b|\brate[-_ ]?limit|too many requests").ok())
        .as_ref()
}

impl ProviderError {
    /// Classify a failure from its HTTP status (if any) and text.
    ///
    /// Checked in priority order: rate limit, unavailable, unauthorized.
    pub fn classify(status: Option<u16>, kind: &str, message: &str) -> Self {
        let lower = message.to_lowercase();
        let message = message.to_string();

        let throttled = rate_pattern().is_some_and(|p| p.is_match(&lower));
        if status == Some(429) || lower.contains("429") || throttled {
            return Self::RateLimited(message);
        }
        if status == Some(503) || lower.contains("503") || lower.contains("loading") {
            return Self::Unavailable(message);
        }
        if status == Some(401) || lower.contains("401") || lower.contains("unauthorized") {
            return Self::Unauthorized(message);
        }

        Self::Unknown {
            kind: kind.to_string(),
            message,
        }
    }

    /// Classify a non-success HTTP response
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = if body.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {} - {}", status, body)
        };
        Self::classify(Some(status.as_u16()), "HttpStatus", &message)
    }

    /// Classify a transport-level failure
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Unavailable(format!("request timed out: {}", err));
        }
        if err.is_connect() {
            return Self::Unavailable(format!("connection failed: {}", err));
        }

        let kind = if err.is_decode() {
            "Decode"
        } else if err.is_body() {
            "Body"
        } else if err.is_request() {
            "Request"
        } else {
            "Http"
        };
        Self::classify(err.status().map(|s| s.as_u16()), kind, &err.to_string())
    }

    /// A timeout enforced by the caller
    pub fn timed_out(operation: &str, after: Duration) -> Self {
        Self::Unavailable(format!("{} timed out after {:?}", operation, after))
    }

    /// Whether a later retry may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Unavailable(_))
    }
}

/// Run a provider call with a hard deadline; expiry maps to `Unavailable`.
pub async fn with_timeout<T, F>(operation: &str, after: Duration, fut: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} exceeded {:?}", operation, after);
            Err(ProviderError::timed_out(operation, after))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_status() {
        assert!(matches!(
            ProviderError::classify(Some(429), "HttpStatus", "slow down"),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            ProviderError::classify(Some(503), "HttpStatus", "busy"),
            ProviderError::Unavailable(_)
        ));
        assert!(matches!(
            ProviderError::classify(Some(401), "HttpStatus", "nope"),
            ProviderError::Unauthorized(_)
        ));
    }

    #[test]
    fn test_classify_by_message() {
        assert!(matches!(
            ProviderError::classify(None, "HfHubHTTPError", "429 Client Error: Too Many Requests"),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            ProviderError::classify(None, "Http", "Model meta-llama is currently loading"),
            ProviderError::Unavailable(_)
        ));
        assert!(matches!(
            ProviderError::classify(None, "Http", "Unauthorized: invalid token"),
            ProviderError::Unauthorized(_)
        ));
    }

    #[test]
    fn test_rate_limit_takes_priority() {
        // 503 body that also mentions the rate limit
        let err = ProviderError::classify(Some(503), "HttpStatus", "rate limit reached, loading");
        assert!(matches!(err, ProviderError::RateLimited(_)));

        let err = ProviderError::classify(None, "Http", "401 unauthorized while model loading");
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[test]
    fn test_rate_needs_word_boundary() {
        let err = ProviderError::classify(None, "Decode", "failed to generate a response");
        assert_eq!(
            err,
            ProviderError::Unknown {
                kind: "Decode".into(),
                message: "failed to generate a response".into()
            }
        );
    }

    #[test]
    fn test_plural_rates_is_rate_limited() {
        let err = ProviderError::classify(None, "HttpStatus", "request rates exceeded for this model");
        assert!(matches!(err, ProviderError::RateLimited(_)));
        let err = ProviderError::classify(None, "HttpStatus", "Rate-limit hit");
        assert!(matches!(err, ProviderError::RateLimited(_)));
    }

    #[test]
    fn test_from_status_includes_body() {
        let err = ProviderError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "quota");
        assert_eq!(err, ProviderError::RateLimited("HTTP 429 Too Many Requests - quota".into()));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_unavailable() {
        let result: Result<(), _> = with_timeout("generation", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
        assert!(result.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_timeout_passes_result_through() {
        let result = with_timeout("embedding", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }
}
