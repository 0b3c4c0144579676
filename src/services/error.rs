use std::collections::HashMap;
use thiserror::Error;

use crate::auth::AuthError;
use crate::database::DatabaseError;
use crate::platforms::PlatformError;
use crate::services::media_service::MediaError;
use crate::types::PostStatus;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("Validation failed: {0:?}")]
    FieldErrors(HashMap<String, String>),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Cannot move post from {from} to {to}")]
    InvalidTransition { from: PostStatus, to: PostStatus },

    #[error("{0}")]
    OAuthState(String),

    #[error("Authorization was denied: {0}")]
    ProviderDenied(String),

    #[error("{0}")]
    ReauthRequired(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ServiceError::NotFound(what.into())
    }

    /// Whether a later attempt may succeed without user action
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Platform(e) => e.is_transient(),
            ServiceError::Media(MediaError::Fetch(_)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Platform;

    #[test]
    fn transient_follows_platform_class() {
        let upstream = ServiceError::from(PlatformError::Upstream {
            platform: Platform::YouTube,
            message: "503".into(),
        });
        assert!(upstream.is_transient());

        let rejected = ServiceError::from(PlatformError::Rejected {
            platform: Platform::YouTube,
            message: "bad title".into(),
        });
        assert!(!rejected.is_transient());
        assert!(!ServiceError::ReauthRequired("reconnect".into()).is_transient());
    }
}
