//! Login, refresh and logout against the backend's auth endpoints.

use crate::api_client::{
    ApiError, ApiRequest, HttpTransport, LoginRequest, RefreshRequest, TokenResponse,
};
use crate::auth::SessionState;
use crate::configuration::Endpoints;
use crate::foundation::session_store::{AuthTokens, AuthUser};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct AuthGateway {
    transport: Arc<dyn HttpTransport>,
    session: SessionState,
    login_path: String,
    refresh_path: String,
    refresh_lock: Arc<Mutex<()>>,
}

impl AuthGateway {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        session: SessionState,
        endpoints: &Endpoints,
    ) -> Self {
        Self {
            transport,
            session,
            login_path: endpoints.login.clone(),
            refresh_path: endpoints.refresh.clone(),
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// True for the login and refresh endpoints, which are never intercepted.
    pub fn is_auth_endpoint(&self, path: &str) -> bool {
        path.contains(&self.login_path) || path.contains(&self.refresh_path)
    }

    pub async fn login(&self, credentials: &LoginRequest) -> Result<AuthUser, ApiError> {
        let request = ApiRequest::post_json(&self.login_path, credentials)?;
        let response = self.transport.execute(request).await?;

        if !response.is_success() {
            let error = ApiError::from_response(&response);
            warn!(username = %credentials.username, error = %error, "login failed");
            return Err(match error {
                ApiError::Auth(_) => ApiError::Auth("Usuário ou senha inválidos".to_string()),
                other => other,
            });
        }

        let tokens: TokenResponse = response.json()?;
        let user = self.apply(tokens, None)?;
        info!(username = %user.username, role = %user.role, "logged in");
        Ok(user)
    }

    /// Exchanges the refresh token for a new token pair.
    ///
    /// Any failure logs the user out and is reported as `ApiError::Auth`.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Refresh on behalf of a request rejected while carrying `failed_token`.
    ///
    /// Refreshes are serialized; when another caller already replaced the
    /// failing token, the new one is reused and no refresh call is made.
    pub async fn refresh_after_failure(&self, failed_token: Option<&str>) -> Result<(), ApiError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.session.access_token();
        if current.is_some() && current.as_deref() != failed_token {
            debug!("token already refreshed by a concurrent request");
            return Ok(());
        }

        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<(), ApiError> {
        let Some(refresh_token) = self.session.refresh_token() else {
            self.logout();
            return Err(ApiError::Auth("no refresh token available".to_string()));
        };

        debug!("refreshing access token");
        match self.request_refresh(&refresh_token).await {
            Ok(tokens) => {
                self.apply(tokens, Some(refresh_token))?;
                info!("access token refreshed");
                Ok(())
            }
            Err(error) => {
                warn!(error = %error, "token refresh failed");
                self.logout();
                Err(match error {
                    ApiError::Auth(message) => ApiError::Auth(message),
                    other => ApiError::Auth(other.to_string()),
                })
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<TokenResponse, ApiError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        let response = self
            .transport
            .execute(ApiRequest::post_json(&self.refresh_path, &body)?)
            .await?;

        if !response.is_success() {
            return Err(ApiError::from_response(&response));
        }
        response.json()
    }

    /// Stores a token response in the session.
    ///
    /// Backends that do not rotate refresh tokens omit them: the previous one
    /// is kept, and on first login the access token doubles as refresh token.
    fn apply(
        &self,
        response: TokenResponse,
        previous_refresh: Option<String>,
    ) -> Result<AuthUser, ApiError> {
        let refresh_token = response
            .refresh_token
            .or(previous_refresh)
            .unwrap_or_else(|| response.access_token.clone());

        let user = AuthUser {
            username: response.username,
            role: response.role,
        };
        let tokens = AuthTokens {
            access_token: response.access_token,
            refresh_token,
        };

        self.session.set_authenticated(user.clone(), tokens)?;
        Ok(user)
    }

    /// Drops the session. Store failures are logged, the in-memory state is
    /// cleared regardless.
    pub fn logout(&self) {
        if let Err(e) = self.session.clear_authentication() {
            warn!(error = %e, "failed to delete persisted tokens");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::{ApiResponse, MockHttpTransport, RequestBody};
    use crate::foundation::session_store::TokenStore;
    use serde_json::json;

    fn gateway(transport: MockHttpTransport) -> AuthGateway {
        let session = SessionState::restore(TokenStore::temporary().unwrap()).unwrap();
        AuthGateway::new(Arc::new(transport), session, &Endpoints::default())
    }

    fn credentials() -> LoginRequest {
        LoginRequest {
            username: "admin".to_string(),
            password: "secret".to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_sets_session() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|request| {
                request.path == "/auth/login"
                    && request.bearer_token.is_none()
                    && request.body
                        == RequestBody::Json(json!({"username": "admin", "password": "secret"}))
            })
            .times(1)
            .returning(|_| {
                Ok(ApiResponse::json_body(
                    200,
                    json!({"accessToken": "a1", "refreshToken": "r1", "username": "admin", "role": "ADMIN"}),
                ))
            });

        let gateway = gateway(transport);
        let user = gateway.login(&credentials()).await.unwrap();

        assert_eq!(user.username, "admin");
        assert!(gateway.session().is_authenticated());
        assert_eq!(gateway.session().access_token().as_deref(), Some("a1"));
        assert_eq!(gateway.session().refresh_token().as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_login_with_bad_credentials() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Ok(ApiResponse::new(401, Vec::new())));

        let gateway = gateway(transport);
        let error = gateway.login(&credentials()).await.unwrap_err();

        assert!(error.is_auth());
        assert!(!gateway.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_refresh_without_token_logs_out() {
        let mut transport = MockHttpTransport::new();
        transport.expect_execute().times(0);

        let gateway = gateway(transport);
        let error = gateway.refresh().await.unwrap_err();

        assert!(error.is_auth());
        assert!(!gateway.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_not_rotated() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|request| {
                request.path == "/auth/refresh"
                    && request.body == RequestBody::Json(json!({"refreshToken": "r1"}))
            })
            .times(1)
            .returning(|_| {
                Ok(ApiResponse::json_body(
                    200,
                    json!({"token": "a2", "username": "admin", "role": "ADMIN"}),
                ))
            });

        let gateway = gateway(transport);
        gateway
            .session()
            .set_tokens(AuthTokens {
                access_token: "a1".to_string(),
                refresh_token: "r1".to_string(),
            })
            .unwrap();

        gateway.refresh().await.unwrap();

        assert_eq!(gateway.session().access_token().as_deref(), Some("a2"));
        assert_eq!(gateway.session().refresh_token().as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_persisted_tokens() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Ok(ApiResponse::new(500, Vec::new())));

        let gateway = gateway(transport);
        gateway
            .session()
            .set_tokens(AuthTokens {
                access_token: "a1".to_string(),
                refresh_token: "r1".to_string(),
            })
            .unwrap();

        let error = gateway.refresh().await.unwrap_err();

        assert!(error.is_auth());
        assert!(gateway.session().store().is_empty());
    }

    #[test]
    fn test_auth_endpoint_detection() {
        let gateway = gateway(MockHttpTransport::new());

        assert!(gateway.is_auth_endpoint("/auth/login"));
        assert!(gateway.is_auth_endpoint("/auth/refresh"));
        assert!(!gateway.is_auth_endpoint("/v1/artist"));
    }
}
