// 支付账号数据模型
// 以 app_id 是否为空区分服务商模式和普通商户模式

use serde::Deserialize;
use sqlx::FromRow;
use std::fmt;

/// 账号类型：微信
pub const ACCOUNT_TYPE_WECHAT: &str = "wechat";

/// 支付账号 (payment_accounts 表)
#[derive(Clone, Deserialize, FromRow, PartialEq)]
pub struct PaymentAccount {
    pub id: i64,
    pub account_type: String,
    pub name: String,
    /// 微信商户号
    pub mer_id: String,
    /// 服务商的AppID，不为空表示该账号为服务商账号
    pub app_id: String,
    /// APIv3密钥，用于解密通知
    pub api_v3_secret: String,
    /// 商户API证书序列号
    pub cert_serial_number: String,
    /// 商户API私钥 (PEM)
    pub cert_private: String,
}

impl PaymentAccount {
    pub fn is_wechat_service_provider_account(&self) -> bool {
        self.account_type == ACCOUNT_TYPE_WECHAT && !self.app_id.is_empty()
    }
}

// 密钥材料不进日志
impl fmt::Debug for PaymentAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentAccount")
            .field("id", &self.id)
            .field("account_type", &self.account_type)
            .field("name", &self.name)
            .field("mer_id", &self.mer_id)
            .field("app_id", &self.app_id)
            .field("cert_serial_number", &self.cert_serial_number)
            .finish_non_exhaustive()
    }
}
