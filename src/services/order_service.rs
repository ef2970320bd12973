// 下单服务
// JSAPI(小程序/公众号)、APP、Native 下单，以及调起支付参数的构造和签名

use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::credential_cache::CredentialCache;
use super::gateway::{MerchantCredentials, PaymentGateway};
use super::store::PaymentStore;
use crate::errors::OrderError;
use crate::models::{CreatePrepayRequest, NativePayRequest, OrderParams, PayFrom, StoreContext, TradeType};
use crate::utils::{generate_nonce_str, parse_id, validate_total_price, validate_trans_no};

/// 微信支付结果通知的回调路径前缀
pub const PAYMENT_NOTIFY_PATH: &str = "/wechat/payment_notify/";

pub struct OrderService {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    credentials: Arc<CredentialCache>,
    /// 本服务对外地址，用于拼接通知回调地址
    self_api_url: String,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        credentials: Arc<CredentialCache>,
        self_api_url: &str,
    ) -> Self {
        Self {
            store,
            gateway,
            credentials,
            self_api_url: self_api_url.trim_end_matches('/').to_string(),
        }
    }

    /// 支付结果通知地址
    pub fn notify_url(&self, trans_no: &str) -> String {
        format!("{}{}{}", self.self_api_url, PAYMENT_NOTIFY_PATH, trans_no)
    }

    /// JSAPI/APP 下单并生成调起支付的参数
    ///
    /// # Returns
    /// * 已签名的调起支付参数，小程序和APP的字段不同
    pub async fn create_prepay(&self, request: &CreatePrepayRequest) -> Result<Map<String, Value>, OrderError> {
        validate_order(&request.trans_no, request.total_price)?;
        let open_id = request.open_id.as_deref().filter(|id| !id.is_empty());
        if request.from == PayFrom::Mp && open_id.is_none() {
            return Err(OrderError::InvalidRequest("open_id is required for mp payment".to_string()));
        }

        let (credentials, store) = self
            .load_context(&request.payment_account_id, &request.store_id)
            .await?;

        let params = OrderParams {
            trade_type: TradeType::from(request.from),
            trans_no: request.trans_no.clone(),
            app_id: request.app_id.clone(),
            open_id: open_id.map(str::to_string),
            description: request.desp.clone(),
            total: request.total_price,
            notify_url: self.notify_url(&request.trans_no),
        };
        let platform = self
            .credentials
            .platform_certificates(self.gateway.as_ref(), &credentials)
            .await?;
        let rsp = self
            .gateway
            .create_order(&credentials, &platform, store.as_ref(), &params)
            .await?;

        let prepay_id = rsp
            .get("prepay_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or(OrderError::MissingPrepayId)?;

        log::info!("wechat prepay created, trans_no: {}, prepay_id: {}", request.trans_no, prepay_id);

        self.build_pay_params(
            &credentials,
            request.from,
            &request.app_id,
            prepay_id,
            &chrono::Utc::now().timestamp().to_string(),
            &generate_nonce_str(32),
        )
    }

    /// Native 下单
    ///
    /// # Returns
    /// * 二维码链接 `code_url`
    pub async fn create_native(&self, request: &NativePayRequest) -> Result<String, OrderError> {
        validate_order(&request.trans_no, request.total_price)?;

        let (credentials, store) = self
            .load_context(&request.payment_account_id, &request.store_id)
            .await?;

        let params = OrderParams {
            trade_type: TradeType::Native,
            trans_no: request.trans_no.clone(),
            app_id: request.app_id.clone(),
            open_id: None,
            description: request.desp.clone(),
            total: request.total_price,
            notify_url: self.notify_url(&request.trans_no),
        };
        let platform = self
            .credentials
            .platform_certificates(self.gateway.as_ref(), &credentials)
            .await?;
        let rsp = self
            .gateway
            .create_order(&credentials, &platform, store.as_ref(), &params)
            .await?;

        match rsp.get("code_url").and_then(Value::as_str) {
            Some(code_url) if !code_url.is_empty() => Ok(code_url.to_string()),
            _ => Err(OrderError::MissingCodeUrl(rsp.to_string())),
        }
    }

    /// 构造并签名调起支付参数
    ///
    /// 小程序签名串: `appId\ntimeStamp\nnonceStr\npackage\n`
    /// APP签名串: `appId\ntimeStamp\nnonceStr\nprepayId\n`
    pub fn build_pay_params(
        &self,
        credentials: &MerchantCredentials,
        from: PayFrom,
        app_id: &str,
        prepay_id: &str,
        timestamp: &str,
        nonce: &str,
    ) -> Result<Map<String, Value>, OrderError> {
        let params = match from {
            PayFrom::App => {
                let message = format!("{}\n{}\n{}\n{}\n", app_id, timestamp, nonce, prepay_id);
                let sign = self
                    .gateway
                    .sign_message(credentials, &message)
                    .map_err(OrderError::PayParams)?;
                json!({
                    "appId": app_id,
                    "partnerId": credentials.account.mer_id,
                    "prepayId": prepay_id,
                    "packageValue": "Sign=WXPay",
                    "timeStamp": timestamp,
                    "nonceStr": nonce,
                    "signType": "RSA",
                    "sign": sign,
                })
            }
            PayFrom::Mp => {
                let package = format!("prepay_id={}", prepay_id);
                let message = format!("{}\n{}\n{}\n{}\n", app_id, timestamp, nonce, package);
                let pay_sign = self
                    .gateway
                    .sign_message(credentials, &message)
                    .map_err(OrderError::PayParams)?;
                json!({
                    "timeStamp": timestamp,
                    "nonceStr": nonce,
                    "package": package,
                    "signType": "RSA",
                    "paySign": pay_sign,
                })
            }
        };

        match params {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    /// 加载账号凭证和店铺
    ///
    /// 服务商账号必须有配置了子商户号的店铺
    async fn load_context(
        &self,
        payment_account_id: &str,
        store_id: &str,
    ) -> Result<(Arc<MerchantCredentials>, Option<StoreContext>), OrderError> {
        let account_id = parse_id("payment_account_id", payment_account_id)
            .map_err(|e| OrderError::InvalidRequest(e.to_string()))?;
        let credentials = self
            .credentials
            .get_or_load(self.store.as_ref(), account_id)
            .await
            .map_err(|source| OrderError::Account {
                id: payment_account_id.to_string(),
                source,
            })?;

        let store = match parse_id("store_id", store_id) {
            Ok(id) => self.store.find_store(id).await?,
            Err(e) if credentials.account.is_wechat_service_provider_account() => {
                return Err(OrderError::InvalidRequest(e.to_string()));
            }
            Err(_) => None,
        };

        if credentials.account.is_wechat_service_provider_account() {
            let has_sub_mchid = store
                .as_ref()
                .map_or(false, |s| !s.wechat_payment_mer_id.is_empty());
            if !has_sub_mchid {
                return Err(OrderError::StoreNotFound(store_id.to_string()));
            }
        }

        Ok((credentials, store))
    }
}

fn validate_order(trans_no: &str, total_price: i64) -> Result<(), OrderError> {
    validate_trans_no(trans_no).map_err(|e| OrderError::InvalidRequest(e.to_string()))?;
    validate_total_price(total_price).map_err(|e| OrderError::InvalidRequest(e.to_string()))?;
    Ok(())
}
