use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{generate_jwt, hash_password_blocking, verify_password_blocking, AuthError, Claims, DUMMY_HASH};
use crate::database::models::{User, UserView};
use crate::services::error::ServiceError;
use crate::state::AppState;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct Session {
    pub token: String,
    pub expires_in: u64,
    pub user: UserView,
}

/// Application users and their sessions
pub struct AuthService {
    state: AppState,
}

impl AuthService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<Session, ServiceError> {
        let email = normalize_email(&request.email)?;
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ServiceError::validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let password_hash = hash_password_blocking(request.password).await?;
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash,
            display_name: request
                .display_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            created_at: now,
            updated_at: now,
        };

        self.state.store.insert_user(&user).await.map_err(|e| match e {
            crate::database::DatabaseError::Conflict(_) => {
                ServiceError::Conflict(format!("an account for {} already exists", user.email))
            }
            other => other.into(),
        })?;

        info!("Registered user {}", user.id);
        self.session_for(&user)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<Session, ServiceError> {
        // Unknown email and wrong password produce the same error
        let email = normalize_email(&request.email).map_err(|_| AuthError::InvalidCredentials)?;
        let Some(user) = self.state.store.find_user_by_email(&email).await? else {
            verify_password_blocking(DUMMY_HASH.to_string(), request.password).await?;
            return Err(AuthError::InvalidCredentials.into());
        };

        if !verify_password_blocking(user.password_hash.clone(), request.password).await? {
            warn!("Failed login for user {}", user.id);
            return Err(AuthError::InvalidCredentials.into());
        }

        self.session_for(&user)
    }

    pub async fn whoami(&self, user_id: Uuid) -> Result<UserView, ServiceError> {
        let user = self
            .state
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("user"))?;
        Ok(UserView::from(&user))
    }

    fn session_for(&self, user: &User) -> Result<Session, ServiceError> {
        let security = &self.state.config.security;
        let claims = Claims::new(user.id, user.email.clone(), security.jwt_expiry_hours);
        let token = generate_jwt(&claims, &security.jwt_secret)?;

        Ok(Session {
            token,
            expires_in: security.jwt_expiry_hours * 3600,
            user: UserView::from(user),
        })
    }
}

/// Trim and lowercase; exactly one `@` with non-empty parts
pub fn normalize_email(raw: &str) -> Result<String, ServiceError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(ServiceError::validation("a valid email address is required"));
    }
    Ok(email)
}
