//! Web 服务器配置
//!
//! 使用类型安全的环境变量系统进行配置管理

use std::env;
use std::fmt;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Environment variable '{}': {}",
            self.variable, self.message
        )
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required_var(name: &str) -> EnvResult<String> {
    env::var(name).map_err(|_| EnvError {
        variable: name.to_string(),
        message: "Required environment variable not set".to_string(),
    })
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> EnvResult<T> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(|_| EnvError {
            variable: name.to_string(),
            message: format!("Cannot parse '{}'", value),
        }),
        Err(_) => Ok(default),
    }
}

/// 上游模型服务配置
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// API 密钥
    pub api_key: String,
    /// API 基地址
    pub base_url: String,
    /// 模型名称
    pub model: String,
    /// 单次补全的 token 上限
    pub max_tokens: u32,
}

impl UpstreamConfig {
    /// 从环境变量创建配置
    pub fn from_env() -> EnvResult<Self> {
        Ok(Self {
            api_key: required_var("OPENAI_API_KEY")?,
            base_url: var_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            model: var_or("OPENAI_MODEL", "gpt-4o-mini"),
            max_tokens: parsed_var("OPENAI_MAX_TOKENS", 2000)?,
        })
    }
}

/// Web 服务器配置
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// 绑定地址
    pub bind_addr: String,
    /// 端口
    pub port: u16,
    /// 上游模型服务配置
    pub upstream: UpstreamConfig,
    /// `/api/simplify` 每指纹窗口内请求上限
    pub rate_ceiling: u32,
    /// `/api/playground` 每指纹窗口内请求上限
    pub playground_rate_ceiling: u32,
    /// 限速窗口时长（毫秒）
    pub rate_window_ms: u64,
}

impl WebConfig {
    /// 从环境变量创建配置
    pub fn from_env() -> EnvResult<Self> {
        Ok(Self {
            bind_addr: var_or("TWELVIFY_BIND_ADDRESS", "127.0.0.1"),
            port: parsed_var("TWELVIFY_PORT", 3000)?,
            upstream: UpstreamConfig::from_env()?,
            rate_ceiling: parsed_var("TWELVIFY_RATE_LIMIT", 30)?,
            playground_rate_ceiling: parsed_var("TWELVIFY_PLAYGROUND_RATE_LIMIT", 60)?,
            rate_window_ms: parsed_var("TWELVIFY_RATE_WINDOW_MS", 60_000)?,
        })
    }

    /// 验证配置
    pub fn validate(&self) -> EnvResult<()> {
        if self.bind_addr.is_empty() {
            return Err(EnvError {
                variable: "TWELVIFY_BIND_ADDRESS".to_string(),
                message: "Bind address cannot be empty".to_string(),
            });
        }

        if self.port == 0 {
            return Err(EnvError {
                variable: "TWELVIFY_PORT".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if self.upstream.api_key.is_empty() {
            return Err(EnvError {
                variable: "OPENAI_API_KEY".to_string(),
                message: "API key cannot be empty".to_string(),
            });
        }

        if self.rate_window_ms == 0 {
            return Err(EnvError {
                variable: "TWELVIFY_RATE_WINDOW_MS".to_string(),
                message: "Rate window cannot be 0".to_string(),
            });
        }

        Ok(())
    }

    /// 获取完整的监听地址
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}
