// 微信支付API处理器
// 下单、Native下单、支付结果通知、查单

use actix_web::{web, HttpResponse, Result as ActixResult};
use serde_json::json;

use crate::models::{ApiResponse, CreatePrepayRequest, NativePayRequest, StateCheckRequest, WebhookFailure};
use crate::state::AppStateData;

/// JSAPI/APP 下单，生成调起支付的参数
///
/// POST /wechat/gen_mp_prepay
///
/// 小程序和公众号网页指定 `from: mp`，APP支付指定 `from: app`
/// 响应: 已签名的调起支付参数
pub async fn gen_mp_prepay(
    data: AppStateData,
    request: web::Json<CreatePrepayRequest>,
) -> ActixResult<HttpResponse> {
    match data.orders.create_prepay(&request).await {
        Ok(params) => Ok(HttpResponse::Ok().json(ApiResponse::success(params))),
        Err(e) => {
            log::warn!("gen prepay failed, trans_no: {}, err: {}", request.trans_no, e);
            Ok(HttpResponse::Ok().json(ApiResponse::<()>::error(e.to_string())))
        }
    }
}

/// Native 下单
///
/// POST /wechat/native_pay
///
/// 响应: `{"code_url": "..."}`
pub async fn native_pay(
    data: AppStateData,
    request: web::Json<NativePayRequest>,
) -> ActixResult<HttpResponse> {
    match data.orders.create_native(&request).await {
        Ok(code_url) => Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "code_url": code_url })))),
        Err(e) => {
            log::warn!("native pay failed, trans_no: {}, err: {}", request.trans_no, e);
            Ok(HttpResponse::Ok().json(ApiResponse::<()>::error(e.to_string())))
        }
    }
}

/// 微信支付结果通知
///
/// POST /wechat/payment_notify/{trans_no}
///
/// 无需认证
/// 订单号非法或找不到支付记录时返回200 (重发没有意义)，其他错误返回500让微信按自己的策略重发
pub async fn payment_notify(
    data: AppStateData,
    path: web::Path<String>,
    body: web::Bytes,
) -> ActixResult<HttpResponse> {
    let trans_no = path.into_inner();

    match data.reconciler.reconcile(&trans_no, &body).await {
        Ok(ack) => Ok(HttpResponse::Ok().json(ack)),
        Err(e) if !e.is_retryable() => {
            log::warn!("wechat notify rejected, trans_no: {}, err: {}", trans_no, e);
            Ok(HttpResponse::Ok().json(ApiResponse::<()>::error(e.to_string())))
        }
        Err(e) => {
            log::error!("wechat notify failed, trans_no: {}, err: {}", trans_no, e);
            Ok(HttpResponse::InternalServerError().json(WebhookFailure::new(e.to_string())))
        }
    }
}

/// 使用商户订单号查询支付状态
///
/// POST /wechat/payment_check
///
/// 响应: `{"payment_state": {...}}`
pub async fn payment_check(
    data: AppStateData,
    request: web::Json<StateCheckRequest>,
) -> ActixResult<HttpResponse> {
    let state = match data.poller.check(&request).await {
        Ok(state) => state,
        Err(e) => {
            return Ok(HttpResponse::Ok().json(ApiResponse::<()>::error(e.to_string())));
        }
    };

    if let Some(err) = &state.error {
        return Ok(HttpResponse::Ok().json(ApiResponse::<()>::error(format!(
            "check trans_no state error, payment account id: {}, trans_no: {}, err: {}",
            request.payment_account_id, request.trans_no, err
        ))));
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "payment_state": state.to_payload() }))))
}
