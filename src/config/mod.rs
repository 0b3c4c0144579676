use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub platforms: PlatformsConfig,
    pub scheduler: SchedulerConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub max_request_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection string, or `memory://` for the in-process store
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub cors_origins: Vec<String>,
    pub oauth_state_ttl_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformsConfig {
    pub facebook: FacebookConfig,
    pub instagram: InstagramConfig,
    pub youtube: YouTubeConfig,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacebookConfig {
    pub app_id: String,
    pub app_secret: String,
    pub redirect_uri: String,
    pub dialog_url: String,
    pub graph_url: String,
    pub graph_version: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramConfig {
    pub app_id: String,
    pub app_secret: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub api_url: String,
    pub graph_url: String,
    pub graph_version: String,
    pub scopes: Vec<String>,
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub api_url: String,
    pub upload_url: String,
    pub scopes: Vec<String>,
    pub category_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub max_attempts: i32,
    pub retry_backoff_secs: i64,
    pub min_lead_secs: i64,
    pub refresh_lead_secs: i64,
    pub refresh_batch_size: usize,
    pub refresh_retry_attempts: u32,
    pub refresh_retry_delay_ms: u64,
    /// Posts still publishing after this long are failed by the next tick
    pub publishing_timeout_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub root_dir: String,
    pub public_base_url: String,
    pub max_upload_bytes: usize,
    pub max_fetch_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Some(v) = env_var(&["SERVER_PORT", "PORT"]) {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("SERVER_MAX_REQUEST_BYTES") {
            self.server.max_request_bytes = v.parse().unwrap_or(self.server.max_request_bytes);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_AUTO_MIGRATE") {
            self.database.auto_migrate = v.parse().unwrap_or(self.database.auto_migrate);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = split_list(&v, ',');
        }
        if let Ok(v) = env::var("SECURITY_OAUTH_STATE_TTL_SECS") {
            self.security.oauth_state_ttl_secs = v.parse().unwrap_or(self.security.oauth_state_ttl_secs);
        }

        // Facebook overrides
        let fb = &mut self.platforms.facebook;
        if let Ok(v) = env::var("FACEBOOK_APP_ID") {
            fb.app_id = v;
        }
        if let Ok(v) = env::var("FACEBOOK_APP_SECRET") {
            fb.app_secret = v;
        }
        if let Ok(v) = env::var("FACEBOOK_REDIRECT_URI") {
            fb.redirect_uri = v;
        }
        if let Ok(v) = env::var("FACEBOOK_DIALOG_URL") {
            fb.dialog_url = v;
        }
        if let Ok(v) = env::var("FACEBOOK_GRAPH_URL") {
            fb.graph_url = v;
        }
        if let Ok(v) = env::var("FACEBOOK_GRAPH_VERSION") {
            fb.graph_version = v;
        }

        // Instagram overrides
        let ig = &mut self.platforms.instagram;
        if let Ok(v) = env::var("INSTAGRAM_APP_ID") {
            ig.app_id = v;
        }
        if let Ok(v) = env::var("INSTAGRAM_APP_SECRET") {
            ig.app_secret = v;
        }
        if let Ok(v) = env::var("INSTAGRAM_REDIRECT_URI") {
            ig.redirect_uri = v;
        }
        if let Ok(v) = env::var("INSTAGRAM_AUTHORIZE_URL") {
            ig.authorize_url = v;
        }
        if let Ok(v) = env::var("INSTAGRAM_API_URL") {
            ig.api_url = v;
        }
        if let Ok(v) = env::var("INSTAGRAM_GRAPH_URL") {
            ig.graph_url = v;
        }
        if let Ok(v) = env::var("INSTAGRAM_POLL_INTERVAL_MS") {
            ig.poll_interval_ms = v.parse().unwrap_or(ig.poll_interval_ms);
        }
        if let Ok(v) = env::var("INSTAGRAM_POLL_MAX_ATTEMPTS") {
            ig.poll_max_attempts = v.parse().unwrap_or(ig.poll_max_attempts);
        }

        // YouTube / Google overrides
        let yt = &mut self.platforms.youtube;
        if let Ok(v) = env::var("GOOGLE_CLIENT_ID") {
            yt.client_id = v;
        }
        if let Ok(v) = env::var("GOOGLE_CLIENT_SECRET") {
            yt.client_secret = v;
        }
        if let Ok(v) = env::var("YOUTUBE_REDIRECT_URI") {
            yt.redirect_uri = v;
        }
        if let Ok(v) = env::var("GOOGLE_AUTHORIZE_URL") {
            yt.authorize_url = v;
        }
        if let Ok(v) = env::var("GOOGLE_TOKEN_URL") {
            yt.token_url = v;
        }
        if let Ok(v) = env::var("YOUTUBE_API_URL") {
            yt.api_url = v;
        }
        if let Ok(v) = env::var("YOUTUBE_UPLOAD_URL") {
            yt.upload_url = v;
        }

        if let Ok(v) = env::var("PLATFORM_REQUEST_TIMEOUT_SECS") {
            self.platforms.request_timeout_secs = v.parse().unwrap_or(self.platforms.request_timeout_secs);
        }

        // Scheduler overrides
        let sched = &mut self.scheduler;
        if let Ok(v) = env::var("SCHEDULER_ENABLED") {
            sched.enabled = v.parse().unwrap_or(sched.enabled);
        }
        if let Ok(v) = env::var("SCHEDULER_POLL_INTERVAL_SECS") {
            sched.poll_interval_secs = v.parse().unwrap_or(sched.poll_interval_secs);
        }
        if let Ok(v) = env::var("SCHEDULER_BATCH_SIZE") {
            sched.batch_size = v.parse().unwrap_or(sched.batch_size);
        }
        if let Ok(v) = env::var("SCHEDULER_MAX_CONCURRENCY") {
            sched.max_concurrency = v.parse().unwrap_or(sched.max_concurrency);
        }
        if let Ok(v) = env::var("SCHEDULER_MAX_ATTEMPTS") {
            sched.max_attempts = v.parse().unwrap_or(sched.max_attempts);
        }
        if let Ok(v) = env::var("SCHEDULER_RETRY_BACKOFF_SECS") {
            sched.retry_backoff_secs = v.parse().unwrap_or(sched.retry_backoff_secs);
        }
        if let Ok(v) = env::var("SCHEDULER_MIN_LEAD_SECS") {
            sched.min_lead_secs = v.parse().unwrap_or(sched.min_lead_secs);
        }
        if let Ok(v) = env::var("SCHEDULER_REFRESH_LEAD_SECS") {
            sched.refresh_lead_secs = v.parse().unwrap_or(sched.refresh_lead_secs);
        }
        if let Ok(v) = env::var("SCHEDULER_PUBLISHING_TIMEOUT_SECS") {
            sched.publishing_timeout_secs = v.parse().unwrap_or(sched.publishing_timeout_secs);
        }

        // Media overrides
        if let Ok(v) = env::var("MEDIA_ROOT_DIR") {
            self.media.root_dir = v;
        }
        if let Ok(v) = env::var("MEDIA_PUBLIC_BASE_URL") {
            self.media.public_base_url = v.trim_end_matches('/').to_string();
        }
        if let Ok(v) = env::var("MEDIA_MAX_UPLOAD_BYTES") {
            self.media.max_upload_bytes = v.parse().unwrap_or(self.media.max_upload_bytes);
        }
        if let Ok(v) = env::var("MEDIA_MAX_FETCH_BYTES") {
            self.media.max_fetch_bytes = v.parse().unwrap_or(self.media.max_fetch_bytes);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 3000,
                max_request_bytes: 2 * 1024 * 1024, // 2MB
            },
            database: DatabaseConfig {
                url: "memory://".to_string(),
                max_connections: 10,
                connection_timeout: 30,
                auto_migrate: true,
            },
            security: SecurityConfig {
                jwt_secret: "development-secret-change-me".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                oauth_state_ttl_secs: 600,
            },
            platforms: PlatformsConfig::defaults("http://localhost:3000"),
            scheduler: SchedulerConfig {
                enabled: true,
                poll_interval_secs: 15,
                batch_size: 20,
                max_concurrency: 4,
                max_attempts: 3,
                retry_backoff_secs: 60,
                min_lead_secs: 60,
                refresh_lead_secs: 300,
                refresh_batch_size: 64,
                refresh_retry_attempts: 3,
                refresh_retry_delay_ms: 2000,
                publishing_timeout_secs: 1800,
            },
            media: MediaConfig {
                root_dir: "./media".to_string(),
                public_base_url: "http://localhost:3000".to_string(),
                max_upload_bytes: 256 * 1024 * 1024, // 256MB
                max_fetch_bytes: 512 * 1024 * 1024,
            },
        }
    }

    pub fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.database.url = String::new();
        config.database.max_connections = 20;
        config.database.connection_timeout = 10;
        config.database.auto_migrate = false;
        config.security.jwt_secret = String::new();
        config.security.jwt_expiry_hours = 24;
        config.security.cors_origins = vec!["https://staging.example.com".to_string()];
        config.platforms = PlatformsConfig::defaults("https://staging.example.com");
        config.scheduler.poll_interval_secs = 30;
        config.media.public_base_url = "https://staging.example.com".to_string();
        config
    }

    pub fn production() -> Self {
        let mut config = Self::staging();
        config.environment = Environment::Production;
        config.database.max_connections = 50;
        config.database.connection_timeout = 5;
        config.security.jwt_expiry_hours = 4;
        config.security.cors_origins = vec!["https://app.example.com".to_string()];
        config.platforms = PlatformsConfig::defaults("https://app.example.com");
        config.scheduler.batch_size = 50;
        config.scheduler.max_concurrency = 8;
        config.scheduler.max_attempts = 5;
        config.media.public_base_url = "https://app.example.com".to_string();
        config.media.max_upload_bytes = 1024 * 1024 * 1024; // 1GB
        config
    }

    /// Copy with every secret replaced, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.security.jwt_secret = redact(&copy.security.jwt_secret);
        copy.platforms.facebook.app_secret = redact(&copy.platforms.facebook.app_secret);
        copy.platforms.instagram.app_secret = redact(&copy.platforms.instagram.app_secret);
        copy.platforms.youtube.client_secret = redact(&copy.platforms.youtube.client_secret);
        if let Ok(mut url) = url::Url::parse(&copy.database.url) {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
                copy.database.url = url.to_string();
            }
        }
        copy
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database.url.starts_with("memory://")
    }
}

impl PlatformsConfig {
    fn defaults(app_origin: &str) -> Self {
        Self {
            facebook: FacebookConfig {
                app_id: String::new(),
                app_secret: String::new(),
                redirect_uri: format!("{}/oauth/facebook/callback", app_origin),
                dialog_url: "https://www.facebook.com".to_string(),
                graph_url: "https://graph.facebook.com".to_string(),
                graph_version: "v19.0".to_string(),
                scopes: vec![
                    "pages_show_list".to_string(),
                    "pages_read_engagement".to_string(),
                    "pages_manage_posts".to_string(),
                ],
            },
            instagram: InstagramConfig {
                app_id: String::new(),
                app_secret: String::new(),
                redirect_uri: format!("{}/oauth/instagram/callback", app_origin),
                authorize_url: "https://www.instagram.com/oauth/authorize".to_string(),
                api_url: "https://api.instagram.com".to_string(),
                graph_url: "https://graph.instagram.com".to_string(),
                graph_version: "v19.0".to_string(),
                scopes: vec![
                    "instagram_business_basic".to_string(),
                    "instagram_business_content_publish".to_string(),
                ],
                poll_interval_ms: 3000,
                poll_max_attempts: 40,
            },
            youtube: YouTubeConfig {
                client_id: String::new(),
                client_secret: String::new(),
                redirect_uri: format!("{}/oauth/youtube/callback", app_origin),
                authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                api_url: "https://www.googleapis.com/youtube/v3".to_string(),
                upload_url: "https://www.googleapis.com/upload/youtube/v3".to_string(),
                scopes: vec![
                    "https://www.googleapis.com/auth/youtube.upload".to_string(),
                    "https://www.googleapis.com/auth/youtube.readonly".to_string(),
                ],
                category_id: "22".to_string(),
            },
            request_timeout_secs: 120,
        }
    }
}

fn env_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| env::var(name).ok())
}

fn split_list(value: &str, sep: char) -> Vec<String> {
    value
        .split(sep)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "****".to_string()
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}
