//! tandem-errors - 统一错误处理
//!
//! 缓存协调器各组件共享的错误类型

use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn external_service(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 是否为暂时性故障（网络超时、连接中断等）
    ///
    /// 暂时性故障由远端访问层就地消化，只影响故障探测窗口，
    /// 不会向缓存调用方传播
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Unavailable(_) | Self::ExternalService(_)
        )
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AppError::timeout("op timed out").is_transient());
        assert!(AppError::unavailable("circuit open").is_transient());
        assert!(AppError::external_service("connection refused").is_transient());

        assert!(!AppError::validation("empty key").is_transient());
        assert!(!AppError::internal("bug").is_transient());
    }

    #[test]
    fn test_display_format() {
        let err = AppError::validation("cache key must not be empty");
        assert_eq!(err.to_string(), "Validation error: cache key must not be empty");
    }
}
