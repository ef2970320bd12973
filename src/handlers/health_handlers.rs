// 健康检查API处理器
// 提供存活探测和包含数据库状态的健康检查

use actix_web::{web, HttpResponse, Result as ActixResult};
use serde::Serialize;

use crate::state::AppState;

/// 系统健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 版本信息
    pub version: String,
    /// 运行环境
    pub env: String,
    /// 数据库连接状态
    pub database: String,
    /// 当前时间戳
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// 存活探测
///
/// GET /ping
pub async fn ping() -> HttpResponse {
    HttpResponse::Ok().body("pong, i am running!")
}

/// 基础健康检查
///
/// GET /health
///
/// 无需认证
/// 响应: HealthResponse，数据库不可用时返回503
pub async fn health_check(data: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let mut health = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        env: data.config.web.app_env.clone(),
        database: "connected".to_string(),
        timestamp: chrono::Utc::now(),
    };

    if let Err(e) = data.store.health_check().await {
        log::error!("Database health check failed: {}", e);
        health.database = "disconnected".to_string();
        health.status = "unhealthy".to_string();
        return Ok(HttpResponse::ServiceUnavailable().json(health));
    }

    Ok(HttpResponse::Ok().json(health))
}
