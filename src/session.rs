use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Proof that a user is signed in. Every store call is scoped by the owner
/// this token resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub owner_id: String,
    pub signed_in_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session for an owner already authenticated upstream.
    pub async fn sign_in(&self, owner_id: &str) -> AppResult<Session> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(AppError::Unauthorized("owner id is required".to_string()));
        }

        let session = Session {
            token: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            signed_in_at: Utc::now(),
        };
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.token.clone(), session.clone());
        tracing::info!(owner = %session.owner_id, "session opened");
        Ok(session)
    }

    pub async fn owner_for(&self, token: &str) -> AppResult<String> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(token)
            .map(|session| session.owner_id.clone())
            .ok_or_else(|| AppError::Unauthorized("no active session for token".to_string()))
    }

    pub async fn sign_out(&self, token: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(token).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::SessionManager;
    use crate::errors::AppError;

    #[tokio::test]
    async fn token_resolves_until_sign_out() {
        let manager = SessionManager::new();
        let session = manager.sign_in("user-1").await.expect("sign in");
        assert_eq!(manager.owner_for(&session.token).await.expect("owner"), "user-1");

        assert!(manager.sign_out(&session.token).await);
        assert!(!manager.sign_out(&session.token).await);
        let err = manager.owner_for(&session.token).await.expect_err("signed out");
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn blank_owner_is_rejected() {
        let manager = SessionManager::new();
        assert!(manager.sign_in("  ").await.is_err());
    }
}
