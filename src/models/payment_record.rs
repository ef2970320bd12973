// 支付记录与店铺数据模型
// 支付记录由Web端创建和维护，这里只读取并在对账时写入终态

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::PaymentStatus;

/// 支付记录状态：成功
pub const RECORD_STATUS_SUCCESS: &str = "success";
/// 支付记录状态：失败
pub const RECORD_STATUS_FAILED: &str = "failed";

/// 支付记录 (payment_records 表)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct PaymentRecord {
    pub id: i64,
    /// 商户订单号
    pub trans_no: String,
    /// 关联的支付账号ID
    pub payment_account_id: i64,
    /// 微信订单号/交易号
    pub pay_no: Option<String>,
    /// 记录状态，"success" / "failed" 为终态，其余视为处理中
    pub status: String,
    pub store_id: Option<i64>,
    /// 额外的通知地址，不为空时状态变更也推送到这里
    pub addi_notify_url: Option<String>,
}

impl PaymentRecord {
    pub fn is_success(&self) -> bool {
        self.status == RECORD_STATUS_SUCCESS
    }

    /// 记录是否已到终态，到终态后重复通知只做应答
    pub fn is_terminal(&self) -> bool {
        self.is_success() || self.status == RECORD_STATUS_FAILED
    }

    /// 非空的额外通知地址
    pub fn additional_notify_url(&self) -> Option<&str> {
        self.addi_notify_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// 内部终态对应的记录状态值，非终态返回 None
pub fn record_status_for(status: PaymentStatus) -> Option<&'static str> {
    match status {
        PaymentStatus::Success => Some(RECORD_STATUS_SUCCESS),
        PaymentStatus::Failed => Some(RECORD_STATUS_FAILED),
        PaymentStatus::Pending | PaymentStatus::Unknown => None,
    }
}

/// 店铺 (stores 表)，服务商模式下提供子商户号
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct StoreContext {
    pub id: i64,
    /// 店铺在微信支付的子商户号
    pub wechat_payment_mer_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: &str, addi: Option<&str>) -> PaymentRecord {
        PaymentRecord {
            id: 1,
            trans_no: "T1234567".to_string(),
            payment_account_id: 3,
            pay_no: None,
            status: status.to_string(),
            store_id: Some(21),
            addi_notify_url: addi.map(str::to_string),
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(record("success", None).is_terminal());
        assert!(record("failed", None).is_terminal());
        assert!(!record("pending", None).is_terminal());
        assert!(!record("", None).is_terminal());
    }

    #[test]
    fn test_additional_notify_url() {
        assert_eq!(record("pending", None).additional_notify_url(), None);
        assert_eq!(record("pending", Some("  ")).additional_notify_url(), None);
        assert_eq!(
            record("pending", Some("https://partner.example.com/notify")).additional_notify_url(),
            Some("https://partner.example.com/notify")
        );
    }

    #[test]
    fn test_record_status_for() {
        assert_eq!(record_status_for(PaymentStatus::Success), Some("success"));
        assert_eq!(record_status_for(PaymentStatus::Failed), Some("failed"));
        assert_eq!(record_status_for(PaymentStatus::Pending), None);
        assert_eq!(record_status_for(PaymentStatus::Unknown), None);
    }
}
