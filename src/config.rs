use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // API configuration
    pub api_base_url: String,
    pub realtime_url: Option<String>,
    pub environment: String,
    pub log_level: String,
    pub request_timeout_secs: u64,

    // Cache configuration
    pub cache_stale_secs: u64,
    pub profile_stale_secs: u64,

    // Interaction timing
    pub like_debounce_ms: u64,
    pub typing_idle_ms: u64,
    pub notification_poll_secs: u64,

    // Content settings
    pub max_comment_length: usize,
    pub max_post_length: usize,
    pub friend_request_message_max: usize,

    // Session credentials (binary only)
    pub login_email: Option<String>,
    pub login_password: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            api_base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000/api/".to_string()),
            realtime_url: env::var("REALTIME_URL").ok(),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,

            cache_stale_secs: env::var("CACHE_STALE_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            profile_stale_secs: env::var("PROFILE_STALE_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,

            like_debounce_ms: env::var("LIKE_DEBOUNCE_MS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
            typing_idle_ms: env::var("TYPING_IDLE_MS")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            notification_poll_secs: env::var("NOTIFICATION_POLL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,

            max_comment_length: env::var("MAX_COMMENT_LENGTH")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()?,
            max_post_length: env::var("MAX_POST_LENGTH")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()?,
            friend_request_message_max: env::var("FRIEND_REQUEST_MESSAGE_MAX")
                .unwrap_or_else(|_| "15".to_string())
                .parse()?,

            login_email: env::var("WEY_EMAIL").ok(),
            login_password: env::var("WEY_PASSWORD").ok(),
        })
    }

    /// 以指定的API地址构造默认配置
    pub fn with_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_stale_after(&self) -> Duration {
        Duration::from_secs(self.cache_stale_secs)
    }

    pub fn profile_stale_after(&self) -> Duration {
        Duration::from_secs(self.profile_stale_secs)
    }

    pub fn like_debounce(&self) -> Duration {
        Duration::from_millis(self.like_debounce_ms)
    }

    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }

    pub fn notification_poll_interval(&self) -> Duration {
        Duration::from_secs(self.notification_poll_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api/".to_string(),
            realtime_url: None,
            environment: "development".to_string(),
            log_level: "info".to_string(),
            request_timeout_secs: 30,
            cache_stale_secs: 60,
            profile_stale_secs: 300,
            like_debounce_ms: 300,
            typing_idle_ms: 3000,
            notification_poll_secs: 30,
            max_comment_length: 5000,
            max_post_length: 10000,
            friend_request_message_max: 15,
            login_email: None,
            login_password: None,
        }
    }
}
