// API认证中间件
// 调用方需在 X_GGP_KEY 头中携带约定的密钥，微信通知和健康检查除外

use actix_web::{
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpResponse,
};
use futures_util::future::{ok, Ready};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::models::ApiResponse;
use crate::state::AppState;
use crate::utils::constant_time_eq;

/// 鉴权请求头
pub const AUTH_HEADER: &str = "X_GGP_KEY";

/// API密钥认证中间件
pub struct ApiKeyAuth;

impl<S, B> Transform<S, ServiceRequest> for ApiKeyAuth
where
    S: actix_web::dev::Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = ApiKeyAuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ApiKeyAuthMiddleware { service })
    }
}

pub struct ApiKeyAuthMiddleware<S> {
    service: S,
}

impl<S, B> actix_web::dev::Service<ServiceRequest> for ApiKeyAuthMiddleware<S>
where
    S: actix_web::dev::Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // 检查是否需要认证
        if should_skip_auth(req.path()) || is_authorized(&req) {
            let fut = self.service.call(req);
            return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
        }

        log::warn!("reject unauthorized request: {} {}", req.method(), req.path());
        let response = HttpResponse::Unauthorized().json(ApiResponse::<()>::error("api secret is invalid"));
        Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) })
    }
}

fn is_authorized(req: &ServiceRequest) -> bool {
    let expected = match req.app_data::<web::Data<AppState>>() {
        Some(data) => data.config.auth.api_secret.clone(),
        None => return false,
    };

    req.headers()
        .get(AUTH_HEADER)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |secret| !expected.is_empty() && constant_time_eq(secret, &expected))
}

/// 检查路径是否需要跳过认证
fn should_skip_auth(path: &str) -> bool {
    path == "/health" || path.starts_with("/wechat/payment_notify/")
}
