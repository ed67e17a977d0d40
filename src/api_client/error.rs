use crate::api_client::ApiResponse;
use crate::foundation::utils::{format_wait, parse_retry_hint};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io;
use thiserror::Error;

/// Wait assumed when a 429 response carries no usable hint.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

const RETRY_AFTER_HEADER: &str = "x-rate-limit-retry-after-seconds";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limit exceeded, retry after {} seconds", .retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS))]
    RateLimited { retry_after: Option<u64> },

    #[error("request rejected ({status}): {message}")]
    Validation {
        status: u16,
        message: String,
        fields: BTreeMap<String, String>,
    },

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("session storage error: {0}")]
    Storage(#[from] io::Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        ApiError::Network(error.to_string())
    }
}

/// Error body sent by the backend: an RFC 7807 problem detail, or the ad-hoc
/// object written by the rate limiter.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    title: Option<String>,
    detail: Option<String>,
    message: Option<String>,
    error: Option<String>,
    retry_after: Option<u64>,
    #[serde(default)]
    errors: BTreeMap<String, String>,
}

impl ErrorBody {
    fn parse(response: &ApiResponse) -> Self {
        serde_json::from_slice(&response.body).unwrap_or_default()
    }

    fn text(&self) -> Option<String> {
        self.detail
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.title.clone())
            .or_else(|| self.error.clone())
    }
}

impl ApiError {
    /// Classifies a non-successful response.
    pub fn from_response(response: &ApiResponse) -> Self {
        let body = ErrorBody::parse(response);
        let status = response.status;

        match status {
            401 | 403 => ApiError::Auth(
                body.text()
                    .unwrap_or_else(|| format!("request refused with status {status}")),
            ),
            429 => {
                let retry_after = body
                    .retry_after
                    .or_else(|| {
                        response
                            .header(RETRY_AFTER_HEADER)
                            .and_then(|value| value.trim().parse().ok())
                    })
                    .or_else(|| body.text().as_deref().and_then(parse_retry_hint));
                ApiError::RateLimited { retry_after }
            }
            400..=499 => ApiError::Validation {
                status,
                message: body
                    .text()
                    .unwrap_or_else(|| format!("request rejected with status {status}")),
                fields: body.errors,
            },
            _ => ApiError::Server {
                status,
                message: body
                    .text()
                    .unwrap_or_else(|| format!("unexpected status {status}")),
            },
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }

    /// Seconds to wait before retrying a rate-limited call.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            ApiError::RateLimited { retry_after } => {
                Some(retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS))
            }
            _ => None,
        }
    }

    /// Localized message suitable for the end user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Auth(_) => "Sessão expirada. Faça login novamente.".to_string(),
            ApiError::RateLimited { retry_after } => format!(
                "Muitas requisições. Tente novamente em {}.",
                format_wait(retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS))
            ),
            ApiError::Validation { message, .. } => message.clone(),
            ApiError::Network(_) => "Não foi possível conectar ao servidor.".to_string(),
            ApiError::Server { .. } | ApiError::Decode(_) | ApiError::Storage(_) => {
                "Ocorreu um erro inesperado. Tente novamente.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> ApiResponse {
        ApiResponse::new(status, body.as_bytes().to_vec())
    }

    #[test]
    fn test_rate_limit_with_retry_after() {
        let error = ApiError::from_response(&response(
            429,
            r#"{"error":"Too Many Requests","message":"Rate limit exceeded. Try again in 30 seconds.","retryAfter":30}"#,
        ));

        assert_eq!(error.retry_after_seconds(), Some(30));
        assert!(error.user_message().contains("30 segundos"));
    }

    #[test]
    fn test_rate_limit_without_retry_after_defaults_to_one_minute() {
        let error = ApiError::from_response(&response(429, ""));

        assert_eq!(error.retry_after_seconds(), Some(60));
        assert!(error.user_message().contains("1 minuto"));
    }

    #[test]
    fn test_rate_limit_from_header() {
        let error = ApiError::from_response(
            &response(429, "").with_header("X-Rate-Limit-Retry-After-Seconds", "45"),
        );

        assert_eq!(error.retry_after_seconds(), Some(45));
    }

    #[test]
    fn test_rate_limit_from_message_only() {
        let error = ApiError::from_response(&response(
            429,
            r#"{"message":"Rate limit exceeded. Try again in 7 seconds."}"#,
        ));

        assert_eq!(error.retry_after_seconds(), Some(7));
    }

    #[test]
    fn test_validation_error_keeps_fields() {
        let error = ApiError::from_response(&response(
            400,
            r#"{"title":"Bad Request","detail":"Dados inválidos","errors":{"name":"O nome do artista é obrigatório"}}"#,
        ));

        match error {
            ApiError::Validation {
                status,
                message,
                fields,
            } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Dados inválidos");
                assert_eq!(fields["name"], "O nome do artista é obrigatório");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(ApiError::from_response(&response(401, "")).is_auth());
        assert!(ApiError::from_response(&response(403, "")).is_auth());
        assert!(matches!(
            ApiError::from_response(&response(404, r#"{"detail":"Artista não encontrado"}"#)),
            ApiError::Validation { status: 404, .. }
        ));
        assert!(matches!(
            ApiError::from_response(&response(503, "not json")),
            ApiError::Server { status: 503, .. }
        ));
    }
}
