// 请求日志中间件
// 每个请求一行：客户端地址、方法、路径、协议、状态码、耗时、User-Agent

use actix_web::{
    dev::{ServiceRequest, ServiceResponse, Transform},
    http::header::USER_AGENT,
    Error,
};
use futures_util::future::{ok, Ready};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

/// 请求日志中间件
pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: actix_web::dev::Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestLoggingMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequestLoggingMiddleware { service })
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

/// 单个请求的日志上下文
struct RequestLine {
    remote_addr: String,
    method: String,
    path: String,
    version: String,
    user_agent: String,
}

impl RequestLine {
    fn from_request(req: &ServiceRequest) -> Self {
        Self {
            remote_addr: req
                .connection_info()
                .realip_remote_addr()
                .unwrap_or("unknown")
                .to_string(),
            method: req.method().to_string(),
            path: req.path().to_string(),
            version: format!("{:?}", req.version()),
            user_agent: req
                .headers()
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string(),
        }
    }

    fn log(&self, status: u16, elapsed_ms: u128) {
        let level = if status >= 400 { log::Level::Warn } else { log::Level::Info };
        log::log!(
            level,
            "{} {} {} {} {} {}ms \"{}\"",
            self.remote_addr,
            self.method,
            self.path,
            self.version,
            status,
            elapsed_ms,
            self.user_agent
        );
    }
}

impl<S, B> actix_web::dev::Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: actix_web::dev::Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let line = RequestLine::from_request(&req);

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let elapsed_ms = start_time.elapsed().as_millis();

            match &result {
                Ok(response) => line.log(response.status().as_u16(), elapsed_ms),
                Err(e) => log::error!(
                    "{} {} {} {}ms - ERROR: {}",
                    line.remote_addr,
                    line.method,
                    line.path,
                    elapsed_ms,
                    e
                ),
            }

            result
        })
    }
}
