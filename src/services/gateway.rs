// 支付网关能力接口
// 核心逻辑只依赖这个 trait，具体的微信支付实现见 wechat_client.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::Value;
use std::fmt;

use crate::errors::GatewayError;
use crate::models::{NotifyResource, OrderParams, PaymentAccount, StoreContext};
use crate::utils::load_private_key;

/// 解码后的商户凭证
///
/// 构造后不可变，由 `CredentialCache` 按账号ID缓存共享
pub struct MerchantCredentials {
    pub account: PaymentAccount,
    /// 商户API私钥，用于请求签名和调起支付参数签名
    pub private_key: RsaPrivateKey,
}

impl MerchantCredentials {
    /// 从支付账号解码商户私钥
    pub fn load(account: PaymentAccount) -> Result<Self, GatewayError> {
        let private_key = load_private_key(&account.cert_private)?;
        Ok(Self { account, private_key })
    }
}

impl fmt::Debug for MerchantCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerchantCredentials")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

/// 微信支付平台证书，用于校验网关回包签名
///
/// 注意这个和商户自己的证书不是一回事，需要从网关下载
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformCertificate {
    /// 证书序列号，对应回包的 Wechatpay-Serial 头
    pub serial_no: String,
    pub expire_time: Option<DateTime<Utc>>,
    pub public_key: RsaPublicKey,
}

impl PlatformCertificate {
    /// 没有过期时间的证书视为一直有效
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_time.map_or(true, |expire| expire > now)
    }
}

/// 外部支付网关
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// 下载平台证书
    ///
    /// 无法解密或解析的证书跳过，一个可用证书都没有时返回错误
    async fn download_platform_certificates(
        &self,
        credentials: &MerchantCredentials,
    ) -> Result<Vec<PlatformCertificate>, GatewayError>;

    /// 下单，返回网关回包
    async fn create_order(
        &self,
        credentials: &MerchantCredentials,
        platform: &[PlatformCertificate],
        store: Option<&StoreContext>,
        params: &OrderParams,
    ) -> Result<Value, GatewayError>;

    /// 按商户订单号查询订单状态，返回网关交易文档
    async fn query_order_state(
        &self,
        credentials: &MerchantCredentials,
        platform: &[PlatformCertificate],
        store: Option<&StoreContext>,
        trans_no: &str,
    ) -> Result<Value, GatewayError>;

    /// 解密支付结果通知中的资源
    fn decrypt_notification(
        &self,
        credentials: &MerchantCredentials,
        resource: &NotifyResource,
    ) -> Result<String, GatewayError>;

    /// 使用商户私钥签名，用于调起支付参数
    fn sign_message(&self, credentials: &MerchantCredentials, message: &str) -> Result<String, GatewayError>;
}
