use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::Platform;

/// Pending authorization request, consumed exactly once by the callback
#[derive(Debug, Clone)]
pub struct OAuthState {
    pub state: String,
    pub user_id: Uuid,
    pub platform: Platform,
    pub code_verifier: Option<String>,
    pub redirect_after: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OAuthState {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
