// 微信支付 APIv3 客户端
// 负责请求签名、平台证书下载、回包验签、下单/查单接口调用和通知解密

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::gateway::{MerchantCredentials, PaymentGateway, PlatformCertificate};
use crate::errors::GatewayError;
use crate::models::{NotifyResource, OrderParams, StoreContext, TradeType};
use crate::utils::{
    decrypt_aes_256_gcm, generate_nonce_str, load_certificate_public_key, sign_sha256_rsa, validate_trans_no,
    verify_sha256_rsa,
};

/// 微信支付接口地址
pub const DEFAULT_API_BASE_URL: &str = "https://api.mch.weixin.qq.com";

const AUTH_SCHEMA: &str = "WECHATPAY2-SHA256-RSA2048";
const HEADER_TIMESTAMP: &str = "wechatpay-timestamp";
const HEADER_NONCE: &str = "wechatpay-nonce";
const HEADER_SIGNATURE: &str = "wechatpay-signature";
const HEADER_SERIAL: &str = "wechatpay-serial";
const CERTIFICATES_PATH: &str = "/v3/certificates";

/// 网关原始回包
struct RawResponse {
    status: u16,
    headers: HeaderMap,
    body: String,
}

/// 平台证书列表回包
#[derive(Debug, Deserialize)]
struct CertificateList {
    #[serde(default)]
    data: Vec<CertificateEntry>,
}

#[derive(Debug, Deserialize)]
struct CertificateEntry {
    serial_no: String,
    #[serde(default)]
    expire_time: Option<String>,
    encrypt_certificate: NotifyResource,
}

/// 微信支付 APIv3 客户端
pub struct WechatPayClient {
    client: Client,
    base_url: String,
}

impl WechatPayClient {
    /// 创建客户端
    ///
    /// # Arguments
    /// * `base_url` - 接口地址，测试时指向 mock 服务
    /// * `timeout` - 单次请求超时
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wxpay-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 发送带签名的请求，不校验回包
    async fn send(
        &self,
        credentials: &MerchantCredentials,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<RawResponse, GatewayError> {
        let url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| GatewayError::Protocol(format!("invalid url {}: {}", path, e)))?;
        let canonical_path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let body = body.unwrap_or_default();

        let authorization = build_authorization(
            credentials,
            method.as_str(),
            &canonical_path,
            &body,
            Utc::now().timestamp(),
            &generate_nonce_str(32),
        )?;

        let mut request = self
            .client
            .request(method.clone(), url)
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT, "application/json");
        if !body.is_empty() {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let text = response.text().await?;

        log::debug!("wechat {} {} rsp code: {}, body: {}", method, canonical_path, status, text);

        Ok(RawResponse {
            status,
            headers,
            body: text,
        })
    }

    /// 发送带签名的请求，并用平台证书校验回包
    async fn execute(
        &self,
        credentials: &MerchantCredentials,
        platform: &[PlatformCertificate],
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<Value, GatewayError> {
        let rsp = self.send(credentials, method, path, body).await?;
        verify_response_parts(platform, rsp.status, &rsp.headers, &rsp.body)?;
        serde_json::from_str(&rsp.body)
            .map_err(|e| GatewayError::Protocol(format!("rsp body is not json: {}", e)))
    }
}

#[async_trait]
impl PaymentGateway for WechatPayClient {
    async fn download_platform_certificates(
        &self,
        credentials: &MerchantCredentials,
    ) -> Result<Vec<PlatformCertificate>, GatewayError> {
        let rsp = self.send(credentials, Method::GET, CERTIFICATES_PATH, None).await?;
        if !(200..300).contains(&rsp.status) {
            return Err(GatewayError::Api {
                status: rsp.status,
                body: rsp.body,
            });
        }

        let list: CertificateList = serde_json::from_str(&rsp.body)
            .map_err(|e| GatewayError::Protocol(format!("invalid certificates rsp: {}", e)))?;
        let certificates: Vec<PlatformCertificate> = list
            .data
            .iter()
            .filter_map(|entry| match decode_certificate(&credentials.account.api_v3_secret, entry) {
                Ok(certificate) => Some(certificate),
                Err(e) => {
                    log::warn!("decode wechat platform cert {} error: {}", entry.serial_no, e);
                    None
                }
            })
            .collect();

        if certificates.is_empty() {
            return Err(GatewayError::Protocol("platform cert is 0".to_string()));
        }

        // 证书列表回包用其中的证书自验
        verify_response_parts(&certificates, rsp.status, &rsp.headers, &rsp.body)?;

        log::info!(
            "downloaded {} wechat platform certs for payment account {}",
            certificates.len(),
            credentials.account.id
        );
        Ok(certificates)
    }

    async fn create_order(
        &self,
        credentials: &MerchantCredentials,
        platform: &[PlatformCertificate],
        store: Option<&StoreContext>,
        params: &OrderParams,
    ) -> Result<Value, GatewayError> {
        let path = order_path(credentials, params.trade_type);
        let body = order_body(credentials, store, params)?;
        self.execute(credentials, platform, Method::POST, &path, Some(body.to_string()))
            .await
    }

    async fn query_order_state(
        &self,
        credentials: &MerchantCredentials,
        platform: &[PlatformCertificate],
        store: Option<&StoreContext>,
        trans_no: &str,
    ) -> Result<Value, GatewayError> {
        let path = query_path(credentials, store, trans_no)?;
        self.execute(credentials, platform, Method::GET, &path, None).await
    }

    fn decrypt_notification(
        &self,
        credentials: &MerchantCredentials,
        resource: &NotifyResource,
    ) -> Result<String, GatewayError> {
        decrypt_aes_256_gcm(
            &credentials.account.api_v3_secret,
            &resource.associated_data,
            &resource.nonce,
            &resource.ciphertext,
        )
    }

    fn sign_message(&self, credentials: &MerchantCredentials, message: &str) -> Result<String, GatewayError> {
        sign_sha256_rsa(&credentials.private_key, message)
    }
}

/// 构造 Authorization 请求头
///
/// 签名串: `METHOD\nPATH?QUERY\nTIMESTAMP\nNONCE\nBODY\n`
pub fn build_authorization(
    credentials: &MerchantCredentials,
    method: &str,
    canonical_path: &str,
    body: &str,
    timestamp: i64,
    nonce: &str,
) -> Result<String, GatewayError> {
    let message = format!("{}\n{}\n{}\n{}\n{}\n", method, canonical_path, timestamp, nonce, body);
    let signature = sign_sha256_rsa(&credentials.private_key, &message)?;

    Ok(format!(
        "{} mchid=\"{}\",nonce_str=\"{}\",signature=\"{}\",timestamp=\"{}\",serial_no=\"{}\"",
        AUTH_SCHEMA,
        credentials.account.mer_id,
        nonce,
        signature,
        timestamp,
        credentials.account.cert_serial_number
    ))
}

/// 解密并解析一个平台证书
fn decode_certificate(api_v3_secret: &str, entry: &CertificateEntry) -> Result<PlatformCertificate, GatewayError> {
    let resource = &entry.encrypt_certificate;
    let pem = decrypt_aes_256_gcm(api_v3_secret, &resource.associated_data, &resource.nonce, &resource.ciphertext)?;
    let public_key = load_certificate_public_key(&pem)?;
    let expire_time = entry
        .expire_time
        .as_deref()
        .and_then(|time| DateTime::parse_from_rfc3339(time).ok())
        .map(|time| time.with_timezone(&Utc));

    Ok(PlatformCertificate {
        serial_no: entry.serial_no.clone(),
        expire_time,
        public_key,
    })
}

/// 校验回包
///
/// 非2xx返回 `Api` 错误；2xx回包必须带有平台签名，由 `Wechatpay-Serial` 指定的
/// 平台证书验证签名串 `TIMESTAMP\nNONCE\nBODY\n`
pub fn verify_response_parts(
    platform: &[PlatformCertificate],
    status: u16,
    headers: &HeaderMap,
    body: &str,
) -> Result<(), GatewayError> {
    if !(200..300).contains(&status) {
        return Err(GatewayError::Api {
            status,
            body: body.to_string(),
        });
    }

    let serial = header_value(headers, HEADER_SERIAL)?;
    let timestamp = header_value(headers, HEADER_TIMESTAMP)?;
    let nonce = header_value(headers, HEADER_NONCE)?;
    let signature = header_value(headers, HEADER_SIGNATURE)?;

    let certificate = platform
        .iter()
        .find(|c| c.serial_no.eq_ignore_ascii_case(serial))
        .ok_or_else(|| GatewayError::Protocol(format!("no platform cert with serial {}", serial)))?;

    let message = format!("{}\n{}\n{}\n", timestamp, nonce, body);
    verify_sha256_rsa(&certificate.public_key, &message, signature)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, GatewayError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| GatewayError::Protocol(format!("missing header {}", name)))
}

/// 服务商模式下店铺的子商户号
fn sub_mchid<'a>(store: Option<&'a StoreContext>) -> Result<&'a str, GatewayError> {
    store
        .map(|s| s.wechat_payment_mer_id.as_str())
        .filter(|mer_id| !mer_id.is_empty())
        .ok_or_else(|| {
            GatewayError::Credential("sub merchant id is required for service provider account".to_string())
        })
}

fn order_path(credentials: &MerchantCredentials, trade_type: TradeType) -> String {
    if credentials.account.is_wechat_service_provider_account() {
        format!("/v3/pay/partner/transactions/{}", trade_type.path_segment())
    } else {
        format!("/v3/pay/transactions/{}", trade_type.path_segment())
    }
}

fn query_path(
    credentials: &MerchantCredentials,
    store: Option<&StoreContext>,
    trans_no: &str,
) -> Result<String, GatewayError> {
    // 订单号会拼进签名的URL
    validate_trans_no(trans_no).map_err(|e| GatewayError::Protocol(e.to_string()))?;

    let account = &credentials.account;
    if account.is_wechat_service_provider_account() {
        Ok(format!(
            "/v3/pay/partner/transactions/out-trade-no/{}?sp_mchid={}&sub_mchid={}",
            trans_no,
            account.mer_id,
            sub_mchid(store)?
        ))
    } else {
        Ok(format!(
            "/v3/pay/transactions/out-trade-no/{}?mchid={}",
            trans_no, account.mer_id
        ))
    }
}

/// 构造下单请求体
pub fn order_body(
    credentials: &MerchantCredentials,
    store: Option<&StoreContext>,
    params: &OrderParams,
) -> Result<Value, GatewayError> {
    let account = &credentials.account;
    let mut body = json!({
        "out_trade_no": params.trans_no,
        "description": params.description,
        "notify_url": params.notify_url,
        "amount": {
            "total": params.total,
            "currency": "CNY",
        },
    });

    let service_provider = account.is_wechat_service_provider_account();
    if service_provider {
        body["sp_appid"] = json!(account.app_id);
        body["sp_mchid"] = json!(account.mer_id);
        body["sub_appid"] = json!(params.app_id);
        body["sub_mchid"] = json!(sub_mchid(store)?);
    } else {
        body["appid"] = json!(params.app_id);
        body["mchid"] = json!(account.mer_id);
    }

    if params.trade_type == TradeType::Jsapi {
        let open_id = params
            .open_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GatewayError::Protocol("open_id is required for jsapi order".to_string()))?;
        body["payer"] = if service_provider {
            json!({ "sub_openid": open_id })
        } else {
            json!({ "openid": open_id })
        };
    }

    Ok(body)
}
