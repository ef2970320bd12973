// API路由配置
// 定义所有HTTP接口的路由规则

use actix_web::error::InternalError;
use actix_web::{web, HttpResponse, Scope};

use crate::handlers::*;
use crate::middleware::{ApiKeyAuth, RequestLogging};
use crate::models::ApiResponse;

/// 注册全部路由
///
/// 所有路由都经过请求日志和鉴权中间件，鉴权中间件自行放行公共路径
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config()).service(
        web::scope("")
            .wrap(ApiKeyAuth)
            .wrap(RequestLogging)
            .service(wechat_routes())
            .route("/ping", web::get().to(ping))
            .route("/health", web::get().to(health_check)),
    );
}

/// 微信支付路由
fn wechat_routes() -> Scope {
    web::scope("/wechat")
        .route("/gen_mp_prepay", web::post().to(gen_mp_prepay))
        .route("/native_pay", web::post().to(native_pay))
        .route("/payment_notify/{trans_no}", web::post().to(payment_notify))
        .route("/payment_check", web::post().to(payment_check))
}

/// 请求体解析失败时仍使用 `{status, error}` 格式，HTTP状态码为200
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        log::warn!("invalid request body: {}", message);
        InternalError::from_response(err, HttpResponse::Ok().json(ApiResponse::<()>::error(message))).into()
    })
}
