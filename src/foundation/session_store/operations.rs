use crate::foundation::session_store::AuthTokens;
use sled::Db;
use std::io;

/// Key of the single entry holding the serialized token pair.
const TOKENS_KEY: &str = "auth_tokens";

/// Local persistence for the session tokens.
///
/// The store keeps exactly one entry. Cloning is cheap: every clone shares the
/// same underlying sled tree.
#[derive(Clone)]
pub struct TokenStore {
    db: Db,
}

impl TokenStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// A store backed by a throwaway database, removed when dropped.
    pub fn temporary() -> io::Result<Self> {
        sled::Config::new()
            .temporary(true)
            .open()
            .map(Self::new)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    /// Stores the token pair, replacing any previous entry.
    pub fn save_tokens(&self, tokens: &AuthTokens) -> io::Result<()> {
        let serialized = bincode::serialize(tokens)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        self.db
            .insert(TOKENS_KEY.as_bytes(), serialized)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        self.db
            .flush()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(())
    }

    /// Returns the persisted token pair, if any.
    pub fn load_tokens(&self) -> io::Result<Option<AuthTokens>> {
        self.db
            .get(TOKENS_KEY.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?
            .map(|ivec| {
                bincode::deserialize(&ivec)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
            })
            .transpose()
    }

    /// Deletes the persisted token pair. Clearing an empty store is not an error.
    pub fn clear_tokens(&self) -> io::Result<()> {
        self.db
            .remove(TOKENS_KEY.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        self.db
            .flush()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

/// Opens the token store at the specified path.
///
/// This function creates a new store or opens an existing one at the given path,
/// converting the sled error to a standard IO error.
///
/// # Examples
///
/// ```no_run
/// use musicatalog::open_token_store;
/// let store = open_token_store("/path/to/session_db")?;
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn open_token_store(path: &str) -> io::Result<TokenStore> {
    sled::open(path)
        .map(TokenStore::new)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tokens(access: &str, refresh: &str) -> AuthTokens {
        AuthTokens {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
        }
    }

    #[test]
    fn test_open_token_store() {
        let temp_dir = tempdir().unwrap();
        let binding = temp_dir.path().join("session_db");
        let db_path = binding.to_str().unwrap();

        let result = open_token_store(db_path);
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load_tokens() {
        let store = TokenStore::temporary().unwrap();

        store.save_tokens(&tokens("access-1", "refresh-1")).unwrap();

        let loaded = store.load_tokens().unwrap().unwrap();
        assert_eq!(loaded, tokens("access-1", "refresh-1"));
    }

    #[test]
    fn test_load_from_empty_store() {
        let store = TokenStore::temporary().unwrap();

        assert!(store.load_tokens().unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_overwrite_tokens() {
        let store = TokenStore::temporary().unwrap();

        store.save_tokens(&tokens("old", "old-refresh")).unwrap();
        store.save_tokens(&tokens("new", "new-refresh")).unwrap();

        let loaded = store.load_tokens().unwrap().unwrap();
        assert_eq!(loaded.access_token, "new");
        assert_eq!(loaded.refresh_token, "new-refresh");
    }

    #[test]
    fn test_clear_tokens() {
        let store = TokenStore::temporary().unwrap();

        store.save_tokens(&tokens("access", "refresh")).unwrap();
        store.clear_tokens().unwrap();

        assert!(store.load_tokens().unwrap().is_none());
        assert!(store.is_empty());

        // clearing twice is fine
        assert!(store.clear_tokens().is_ok());
    }
}
