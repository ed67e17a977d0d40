use crate::auth::SessionState;
use tracing::debug;

/// Views a front-end can navigate to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login { return_url: Option<String> },
    Home,
    Artists,
    ArtistDetail(i64),
    AlbumImages(i64),
    Notifications,
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Login { return_url: None } => "/login".to_string(),
            Route::Login {
                return_url: Some(url),
            } => format!("/login?returnUrl={url}"),
            Route::Home => "/home".to_string(),
            Route::Artists => "/artists".to_string(),
            Route::ArtistDetail(id) => format!("/artists/{id}"),
            Route::AlbumImages(id) => format!("/albums/{id}/images"),
            Route::Notifications => "/notifications".to_string(),
        }
    }

    pub fn is_protected(&self) -> bool {
        !matches!(self, Route::Login { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(Route),
}

/// Blocks protected routes while no session exists.
#[derive(Clone)]
pub struct RouteGuard {
    session: SessionState,
}

impl RouteGuard {
    pub fn new(session: SessionState) -> Self {
        Self { session }
    }

    pub fn check(&self, route: &Route) -> GuardDecision {
        if !route.is_protected() || self.session.is_authenticated() {
            return GuardDecision::Allow;
        }

        debug!(route = %route.path(), "navigation blocked, no session");
        GuardDecision::Redirect(Route::Login {
            return_url: Some(route.path()),
        })
    }
}
