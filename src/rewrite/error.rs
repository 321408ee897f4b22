//! 改写模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制

use std::fmt;

use thiserror::Error;

/// 改写错误类型
#[derive(Error, Debug, Clone)]
pub enum RewriteError {
    /// 配置错误（例如缺少API凭据）
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 网络错误
    #[error("网络错误: {0}")]
    NetworkError(String),

    /// 速率限制错误
    #[error("请求速率过快，已达到限制")]
    RateLimitExceeded,

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 分析服务返回非成功状态
    #[error("分析服务错误: {0}")]
    ServiceError(String),

    /// 响应解析错误
    #[error("解析错误: {0}")]
    ParseError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 设置存储错误
    #[error("存储错误: {0}")]
    StorageError(String),

    /// 超时错误
    #[error("操作超时: {0}")]
    TimeoutError(String),

    /// 页面会话已失效（导航或关闭）
    #[error("页面上下文已失效: {0}")]
    ContextInvalidated(String),
}

impl RewriteError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            RewriteError::NetworkError(_) => true,
            RewriteError::TimeoutError(_) => true,
            RewriteError::ServiceError(_) => true,
            RewriteError::StorageError(_) => true,
            RewriteError::RateLimitExceeded => false, // 需要等待
            RewriteError::ConfigError(_) => false,
            RewriteError::InvalidInput(_) => false,
            RewriteError::ParseError(_) => false,
            RewriteError::SerializationError(_) => false,
            RewriteError::ContextInvalidated(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RewriteError::ConfigError(_) => ErrorSeverity::Critical,
            RewriteError::NetworkError(_) => ErrorSeverity::Warning,
            RewriteError::RateLimitExceeded => ErrorSeverity::Warning,
            RewriteError::InvalidInput(_) => ErrorSeverity::Info,
            RewriteError::ServiceError(_) => ErrorSeverity::Error,
            RewriteError::ParseError(_) => ErrorSeverity::Error,
            RewriteError::SerializationError(_) => ErrorSeverity::Error,
            RewriteError::StorageError(_) => ErrorSeverity::Error,
            RewriteError::TimeoutError(_) => ErrorSeverity::Warning,
            RewriteError::ContextInvalidated(_) => ErrorSeverity::Info,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            RewriteError::ConfigError(_) => ErrorCategory::Configuration,
            RewriteError::NetworkError(_) => ErrorCategory::Network,
            RewriteError::RateLimitExceeded => ErrorCategory::RateLimit,
            RewriteError::InvalidInput(_) => ErrorCategory::Input,
            RewriteError::ServiceError(_) => ErrorCategory::Service,
            RewriteError::ParseError(_) => ErrorCategory::Parsing,
            RewriteError::SerializationError(_) => ErrorCategory::Serialization,
            RewriteError::StorageError(_) => ErrorCategory::Storage,
            RewriteError::TimeoutError(_) => ErrorCategory::Timeout,
            RewriteError::ContextInvalidated(_) => ErrorCategory::Context,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        if matches!(self, RewriteError::RateLimitExceeded) {
            return self;
        }
        let new_msg = format!("{} (上下文: {})", self.message(), context);

        match &mut self {
            RewriteError::ConfigError(msg)
            | RewriteError::NetworkError(msg)
            | RewriteError::InvalidInput(msg)
            | RewriteError::ServiceError(msg)
            | RewriteError::ParseError(msg)
            | RewriteError::SerializationError(msg)
            | RewriteError::StorageError(msg)
            | RewriteError::TimeoutError(msg)
            | RewriteError::ContextInvalidated(msg) => *msg = new_msg,
            RewriteError::RateLimitExceeded => {}
        }

        self
    }

    fn message(&self) -> String {
        match self {
            RewriteError::ConfigError(msg)
            | RewriteError::NetworkError(msg)
            | RewriteError::InvalidInput(msg)
            | RewriteError::ServiceError(msg)
            | RewriteError::ParseError(msg)
            | RewriteError::SerializationError(msg)
            | RewriteError::StorageError(msg)
            | RewriteError::TimeoutError(msg)
            | RewriteError::ContextInvalidated(msg) => msg.clone(),
            RewriteError::RateLimitExceeded => String::new(),
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Network,
    RateLimit,
    Input,
    Service,
    Parsing,
    Serialization,
    Storage,
    Timeout,
    Context,
}

impl From<std::io::Error> for RewriteError {
    fn from(error: std::io::Error) -> Self {
        RewriteError::StorageError(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for RewriteError {
    fn from(error: serde_json::Error) -> Self {
        RewriteError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for RewriteError {
    fn from(error: toml::de::Error) -> Self {
        RewriteError::ConfigError(format!("TOML解析错误: {}", error))
    }
}

impl From<reqwest::Error> for RewriteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            RewriteError::TimeoutError(format!("分析请求超时: {}", error))
        } else {
            RewriteError::NetworkError(format!("请求失败: {}", error))
        }
    }
}

/// 错误结果类型别名
pub type RewriteResult<T> = Result<T, RewriteError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误
    pub fn log_error(error: &RewriteError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("改写信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("改写警告: {}", error),
            ErrorSeverity::Error => tracing::error!("改写错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("改写严重错误: {}", error),
        }
    }
}
