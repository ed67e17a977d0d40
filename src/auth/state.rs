//! Process-wide session holder.
//!
//! The current `Session` lives in a `watch` channel: readers take snapshots,
//! front-ends subscribe to changes. Tokens are mirrored to the `TokenStore`.

use crate::foundation::session_store::{AuthTokens, AuthUser, TokenStore};
use std::io;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<AuthUser>,
    pub tokens: Option<AuthTokens>,
    pub is_authenticated: bool,
}

#[derive(Clone)]
pub struct SessionState {
    sender: Arc<watch::Sender<Session>>,
    store: TokenStore,
}

impl SessionState {
    /// Builds the holder from whatever the store persisted.
    ///
    /// Persisted tokens yield an authenticated session with an unknown user.
    /// An unreadable entry is discarded.
    pub fn restore(store: TokenStore) -> io::Result<Self> {
        let initial = match store.load_tokens() {
            Ok(Some(tokens)) => Session {
                user: None,
                tokens: Some(tokens),
                is_authenticated: true,
            },
            Ok(None) => Session::default(),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(error = %e, "discarding unreadable persisted tokens");
                store.clear_tokens()?;
                Session::default()
            }
            Err(e) => return Err(e),
        };

        let (sender, _) = watch::channel(initial);
        Ok(Self {
            sender: Arc::new(sender),
            store,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> Session {
        self.sender.borrow().clone()
    }

    pub fn set_authenticated(&self, user: AuthUser, tokens: AuthTokens) -> io::Result<()> {
        info!(username = %user.username, "session authenticated");
        self.sender.send_replace(Session {
            user: Some(user),
            tokens: Some(tokens.clone()),
            is_authenticated: true,
        });
        self.store.save_tokens(&tokens)
    }

    pub fn set_tokens(&self, tokens: AuthTokens) -> io::Result<()> {
        self.sender.send_modify(|session| {
            session.tokens = Some(tokens.clone());
            session.is_authenticated = true;
        });
        self.store.save_tokens(&tokens)
    }

    /// Resets to the anonymous state and deletes the persisted tokens.
    ///
    /// The in-memory reset always happens, even when the store fails.
    pub fn clear_authentication(&self) -> io::Result<()> {
        info!("session cleared");
        self.sender.send_replace(Session::default());
        self.store.clear_tokens()
    }

    pub fn is_authenticated(&self) -> bool {
        self.sender.borrow().is_authenticated
    }

    pub fn access_token(&self) -> Option<String> {
        self.sender
            .borrow()
            .tokens
            .as_ref()
            .map(|t| t.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.sender
            .borrow()
            .tokens
            .as_ref()
            .map(|t| t.refresh_token.clone())
    }

    pub fn user(&self) -> Option<AuthUser> {
        self.sender.borrow().user.clone()
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }
}
