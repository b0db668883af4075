//! Redis 连接管理

use redis::Client;
use redis::aio::ConnectionManager;
use tandem_errors::{AppError, AppResult};

use crate::retry::{RetryConfig, with_retry};

/// 创建 Redis 连接管理器
pub async fn create_connection_manager(url: &str) -> AppResult<ConnectionManager> {
    let client = Client::open(url)
        .map_err(|e| AppError::unavailable(format!("Failed to create Redis client: {}", e)))?;

    ConnectionManager::new(client).await.map_err(|e| {
        AppError::unavailable(format!("Failed to create Redis connection manager: {}", e))
    })
}

/// 带退避重试的建连
///
/// 进程启动阶段使用，避免 Redis 晚于应用就绪时直接失败
pub async fn connect_with_retry(url: &str, retry: &RetryConfig) -> AppResult<ConnectionManager> {
    with_retry(retry, "connect", || create_connection_manager(url)).await
}

/// 检查 Redis 连接
pub async fn check_connection(conn: &mut ConnectionManager) -> AppResult<()> {
    redis::cmd("PING")
        .query_async::<String>(conn)
        .await
        .map_err(|e| AppError::external_service(format!("Redis health check failed: {}", e)))?;
    Ok(())
}
