//! Authenticated request pipeline.
//!
//! Every catalog call goes through [`AuthInterceptor::send`]:
//!
//! * the current access token is attached as a bearer token;
//! * a 401/403 triggers one refresh through the [`AuthGateway`] and one retry;
//! * a second 401/403, or a failed refresh, ends the session with `ApiError::Auth`;
//! * a 429 publishes a warning notice and returns `ApiError::RateLimited`.
//!
//! Login and refresh calls pass through untouched.

use crate::api_client::{ApiError, ApiRequest, ApiResponse, HttpTransport};
use crate::auth::AuthGateway;
use crate::notice::Notices;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct AuthInterceptor {
    transport: Arc<dyn HttpTransport>,
    gateway: AuthGateway,
    notices: Notices,
}

fn is_auth_failure(status: u16) -> bool {
    status == 401 || status == 403
}

impl AuthInterceptor {
    pub fn new(transport: Arc<dyn HttpTransport>, gateway: AuthGateway, notices: Notices) -> Self {
        Self {
            transport,
            gateway,
            notices,
        }
    }

    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        if self.gateway.is_auth_endpoint(&request.path) {
            let response = self.transport.execute(request).await?;
            return self.finish(response);
        }

        let token = self.gateway.session().access_token();
        let response = self
            .transport
            .execute(request.clone().with_bearer(token.as_deref()))
            .await?;

        if !is_auth_failure(response.status) {
            return self.finish(response);
        }

        debug!(path = %request.path, status = response.status, "request refused, refreshing session");
        if let Err(error) = self.gateway.refresh_after_failure(token.as_deref()).await {
            self.gateway.logout();
            return Err(error);
        }

        let retry_token = self.gateway.session().access_token();
        let retried = self
            .transport
            .execute(request.clone().with_bearer(retry_token.as_deref()))
            .await?;

        if is_auth_failure(retried.status) {
            warn!(path = %request.path, status = retried.status, "request refused after refresh, ending session");
            self.gateway.logout();
            return Err(match ApiError::from_response(&retried) {
                ApiError::Auth(message) => ApiError::Auth(message),
                other => ApiError::Auth(other.to_string()),
            });
        }

        self.finish(retried)
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.send(request).await?.json()
    }

    fn finish(&self, response: ApiResponse) -> Result<ApiResponse, ApiError> {
        if response.is_success() {
            return Ok(response);
        }

        let error = ApiError::from_response(&response);
        if let ApiError::RateLimited { .. } = &error {
            warn!(retry_after = ?error.retry_after_seconds(), "rate limited");
            self.notices.warning(error.user_message());
        }
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::MockHttpTransport;
    use crate::auth::SessionState;
    use crate::configuration::Endpoints;
    use crate::foundation::session_store::{AuthTokens, AuthUser, TokenStore};
    use crate::notice::NoticeLevel;
    use mockall::Sequence;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session_with(access: &str) -> SessionState {
        let session = SessionState::restore(TokenStore::temporary().unwrap()).unwrap();
        session
            .set_authenticated(
                AuthUser {
                    username: "admin".to_string(),
                    role: "ADMIN".to_string(),
                },
                AuthTokens {
                    access_token: access.to_string(),
                    refresh_token: "r1".to_string(),
                },
            )
            .unwrap();
        session
    }

    fn interceptor(transport: MockHttpTransport, session: SessionState) -> AuthInterceptor {
        let transport: Arc<dyn HttpTransport> = Arc::new(transport);
        let gateway = AuthGateway::new(transport.clone(), session, &Endpoints::default());
        AuthInterceptor::new(transport, gateway, Notices::new())
    }

    fn refreshed() -> ApiResponse {
        ApiResponse::json_body(
            200,
            json!({"accessToken": "a2", "refreshToken": "r2", "username": "admin", "role": "ADMIN"}),
        )
    }

    #[tokio::test]
    async fn test_attaches_bearer_token() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|r| r.path == "/v1/artist" && r.bearer_token.as_deref() == Some("a1"))
            .times(1)
            .returning(|_| Ok(ApiResponse::json_body(200, json!({"content": []}))));

        let interceptor = interceptor(transport, session_with("a1"));
        let response = interceptor.send(ApiRequest::get("/v1/artist")).await.unwrap();

        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_no_token_without_session() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|r| r.bearer_token.is_none())
            .times(1)
            .returning(|_| Ok(ApiResponse::new(200, b"{}".to_vec())));

        let session = SessionState::restore(TokenStore::temporary().unwrap()).unwrap();
        let interceptor = interceptor(transport, session);

        assert!(interceptor.send(ApiRequest::get("/v1/artist")).await.is_ok());
    }

    #[tokio::test]
    async fn test_auth_endpoints_are_not_intercepted() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|r| r.path == "/auth/refresh" && r.bearer_token.is_none())
            .times(1)
            .returning(|_| Ok(ApiResponse::new(401, Vec::new())));

        let session = session_with("a1");
        let interceptor = interceptor(transport, session.clone());
        let error = interceptor
            .send(ApiRequest::post_json("/auth/refresh", &json!({"refreshToken": "r1"})).unwrap())
            .await
            .unwrap_err();

        // no refresh, no retry, session untouched
        assert!(error.is_auth());
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_401_refreshes_once_and_retries_once() {
        let mut seq = Sequence::new();
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|r| r.path == "/v1/artist/1" && r.bearer_token.as_deref() == Some("a1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApiResponse::new(401, Vec::new())));
        transport
            .expect_execute()
            .withf(|r| r.path == "/auth/refresh" && r.bearer_token.is_none())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(refreshed()));
        transport
            .expect_execute()
            .withf(|r| r.path == "/v1/artist/1" && r.bearer_token.as_deref() == Some("a2"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApiResponse::json_body(200, json!({"id": 1, "name": "Djavan"}))));

        let session = session_with("a1");
        let interceptor = interceptor(transport, session.clone());
        let response = interceptor.send(ApiRequest::get("/v1/artist/1")).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(session.access_token().as_deref(), Some("a2"));
        assert_eq!(
            session.store().load_tokens().unwrap().unwrap().refresh_token,
            "r2"
        );
    }

    #[tokio::test]
    async fn test_403_is_treated_like_401() {
        let mut seq = Sequence::new();
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|r| r.path == "/v1/album" && r.bearer_token.as_deref() == Some("a1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApiResponse::new(403, Vec::new())));
        transport
            .expect_execute()
            .withf(|r| r.path == "/auth/refresh")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(refreshed()));
        transport
            .expect_execute()
            .withf(|r| r.path == "/v1/album" && r.bearer_token.as_deref() == Some("a2"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApiResponse::new(204, Vec::new())));

        let interceptor = interceptor(transport, session_with("a1"));
        assert!(interceptor.send(ApiRequest::get("/v1/album")).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_refresh_ends_session() {
        let mut seq = Sequence::new();
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|r| r.path == "/v1/artist")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApiResponse::new(401, Vec::new())));
        transport
            .expect_execute()
            .withf(|r| r.path == "/auth/refresh")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApiResponse::new(401, Vec::new())));

        let session = session_with("a1");
        let interceptor = interceptor(transport, session.clone());
        let error = interceptor
            .send(ApiRequest::get("/v1/artist"))
            .await
            .unwrap_err();

        assert!(error.is_auth());
        assert!(!session.is_authenticated());
        assert!(session.store().is_empty());
    }

    #[tokio::test]
    async fn test_401_after_refresh_is_final() {
        let mut seq = Sequence::new();
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|r| r.path == "/v1/artist" && r.bearer_token.as_deref() == Some("a1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApiResponse::new(401, Vec::new())));
        transport
            .expect_execute()
            .withf(|r| r.path == "/auth/refresh")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(refreshed()));
        transport
            .expect_execute()
            .withf(|r| r.path == "/v1/artist" && r.bearer_token.as_deref() == Some("a2"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ApiResponse::new(401, Vec::new())));

        let session = session_with("a1");
        let interceptor = interceptor(transport, session.clone());
        let error = interceptor
            .send(ApiRequest::get("/v1/artist"))
            .await
            .unwrap_err();

        assert!(error.is_auth());
        assert!(!session.is_authenticated());
        assert!(session.store().is_empty());
    }

    #[tokio::test]
    async fn test_429_publishes_notice() {
        let mut transport = MockHttpTransport::new();
        transport.expect_execute().times(1).returning(|_| {
            Ok(ApiResponse::json_body(
                429,
                json!({"error": "Too Many Requests", "retryAfter": 30}),
            ))
        });

        let notices = Notices::new();
        let mut receiver = notices.subscribe();
        let transport: Arc<dyn HttpTransport> = Arc::new(transport);
        let gateway = AuthGateway::new(transport.clone(), session_with("a1"), &Endpoints::default());
        let interceptor = AuthInterceptor::new(transport, gateway, notices);

        let error = interceptor
            .send(ApiRequest::get("/v1/artist"))
            .await
            .unwrap_err();

        assert_eq!(error.retry_after_seconds(), Some(30));
        let notice = receiver.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert!(notice.message.contains("30 segundos"));
    }

    /// Holds every request made with the stale token until both callers have
    /// sent theirs, so the two 401s are in flight at the same time.
    struct StaleTokenBackend {
        barrier: tokio::sync::Barrier,
        refresh_calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl HttpTransport for StaleTokenBackend {
        async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
            if request.path == "/auth/refresh" {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                return Ok(refreshed());
            }
            match request.bearer_token.as_deref() {
                Some("a1") => {
                    self.barrier.wait().await;
                    Ok(ApiResponse::new(401, Vec::new()))
                }
                _ => Ok(ApiResponse::json_body(200, json!({"content": []}))),
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let backend = Arc::new(StaleTokenBackend {
            barrier: tokio::sync::Barrier::new(2),
            refresh_calls: AtomicUsize::new(0),
        });
        let transport: Arc<dyn HttpTransport> = backend.clone();
        let gateway = AuthGateway::new(transport.clone(), session_with("a1"), &Endpoints::default());
        let interceptor = AuthInterceptor::new(transport, gateway, Notices::new());

        let (a, b) = tokio::join!(
            interceptor.send(ApiRequest::get("/v1/artist")),
            interceptor.send(ApiRequest::get("/v1/artist"))
        );

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_network_errors_pass_through() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Err(ApiError::Network("connection refused".to_string())));

        let interceptor = interceptor(transport, session_with("a1"));
        let error = interceptor
            .send(ApiRequest::get("/v1/artist"))
            .await
            .unwrap_err();

        assert!(matches!(error, ApiError::Network(_)));
    }
}
