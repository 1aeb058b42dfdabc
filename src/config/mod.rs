use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// 限流计数器存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    Memory,
    Redis,
    Postgres,
}

impl FromStr for RateLimitBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(ConfigError::Invalid {
                key: "RATE_LIMIT_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

/// 单个限流策略的配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl PolicyConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("RATE_LIMIT_BACKEND={backend} requires {key}")]
    BackendUrl {
        backend: &'static str,
        key: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub frontend_url: String,
    pub supabase_url: String,
    pub service_role_key: String,
    pub jwt_secret: Option<String>,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub rate_limit_backend: RateLimitBackend,
    pub rate_limit_fail_open: bool,
    pub trusted_proxy_hops: usize,
    pub api_limit: PolicyConfig,
    pub auth_limit: PolicyConfig,
    pub upload_limit: PolicyConfig,
    pub storage_bucket: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置，测试中用闭包代替环境变量
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match get("RATE_LIMIT_BACKEND") {
            Some(v) => v.parse()?,
            None => RateLimitBackend::Memory,
        };

        let config = Config {
            server_host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            server_port: parse_or(&get, "SERVER_PORT", 3000)?,
            api_base_uri: normalize_base_uri(
                &get("API_BASE_URI").unwrap_or_else(|| "/make-server-19ccd85e".into()),
            ),
            frontend_url: get("FRONTEND_URL").unwrap_or_else(|| "*".into()),
            supabase_url: get("SUPABASE_URL")
                .ok_or(ConfigError::Missing("SUPABASE_URL"))?
                .trim_end_matches('/')
                .to_string(),
            service_role_key: get("SUPABASE_SERVICE_ROLE_KEY")
                .ok_or(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"))?,
            jwt_secret: get("SUPABASE_JWT_SECRET"),
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            rate_limit_backend: backend,
            rate_limit_fail_open: parse_or(&get, "RATE_LIMIT_FAIL_OPEN", true)?,
            trusted_proxy_hops: parse_or(&get, "TRUSTED_PROXY_HOPS", 0)?,
            api_limit: policy(&get, "RATE_LIMIT_API_REQUESTS", "RATE_LIMIT_API_WINDOW", 100)?,
            auth_limit: policy(&get, "RATE_LIMIT_AUTH_REQUESTS", "RATE_LIMIT_AUTH_WINDOW", 30)?,
            upload_limit: policy(
                &get,
                "RATE_LIMIT_UPLOAD_REQUESTS",
                "RATE_LIMIT_UPLOAD_WINDOW",
                20,
            )?,
            storage_bucket: get("STORAGE_BUCKET").unwrap_or_else(|| "make-19ccd85e-uploads".into()),
        };

        match config.rate_limit_backend {
            RateLimitBackend::Redis if config.redis_url.is_none() => {
                return Err(ConfigError::BackendUrl {
                    backend: "redis",
                    key: "REDIS_URL",
                });
            }
            RateLimitBackend::Postgres if config.database_url.is_none() => {
                return Err(ConfigError::BackendUrl {
                    backend: "postgres",
                    key: "DATABASE_URL",
                });
            }
            _ => {}
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value: raw,
        }),
        None => Ok(default),
    }
}

fn policy<G>(
    get: &G,
    requests_key: &'static str,
    window_key: &'static str,
    default_requests: u32,
) -> Result<PolicyConfig, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let max_requests = parse_or(get, requests_key, default_requests)?;
    if max_requests == 0 {
        return Err(ConfigError::Zero(requests_key));
    }
    // 窗口单位为秒，兼容 "60s" 的写法
    let window_secs = match get(window_key) {
        Some(raw) => raw
            .trim()
            .trim_end_matches('s')
            .parse::<u64>()
            .map_err(|_| ConfigError::Invalid {
                key: window_key,
                value: raw.clone(),
            })?,
        None => 60,
    };
    if window_secs == 0 {
        return Err(ConfigError::Zero(window_key));
    }
    Ok(PolicyConfig {
        max_requests,
        window_secs,
    })
}

fn normalize_base_uri(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
