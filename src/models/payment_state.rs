// 支付状态数据模型
// 网关交易状态到内部状态的唯一映射，以及推送给Web端的通知载荷

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 支付方式标识
pub const PAYMENT_METHOD_WECHAT: &str = "wechat";

/// 内部统一支付状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// 待支付 (未支付、用户支付中)
    Pending,
    /// 支付成功 (终态)
    Success,
    /// 支付失败 (终态)
    Failed,
    /// 无法识别的网关状态，非终态
    Unknown,
}

impl PaymentStatus {
    /// 将微信 `trade_state` 映射为内部状态
    ///
    /// 对账和主动查单共用这一个函数。无法识别的状态一律归为 `Unknown`，
    /// 永远不会被当作成功或失败。
    pub fn from_trade_state(trade_state: &str) -> Self {
        match trade_state {
            "SUCCESS" => PaymentStatus::Success,
            "NOTPAY" | "USERPAYING" => PaymentStatus::Pending,
            "CLOSED" | "REVOKED" | "PAYERROR" | "FAIL" => PaymentStatus::Failed,
            _ => PaymentStatus::Unknown,
        }
    }

    /// 是否为终态
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failed)
    }
}

/// 一次支付尝试在某个时刻的状态快照
///
/// 每个新事实都构造一个新值，构造后不再修改。
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentState {
    /// 商户订单号 (我们生成的 trans_no)
    pub transaction_no: String,
    /// 微信支付订单号 (transaction_id)
    pub gateway_order_no: String,
    /// 内部状态
    pub status: PaymentStatus,
    /// 网关原始交易状态
    pub trade_state: String,
    /// 交易状态描述
    pub status_detail: String,
    /// 支付方式
    pub payment_method: String,
    /// 网关完整回包，留作审计
    pub raw_payload: Value,
    /// 查询失败时的错误信息
    pub error: Option<String>,
}

impl PaymentState {
    /// 由网关交易文档 (解密后的通知或查单回包) 构造状态
    pub fn from_gateway_document(transaction_no: &str, document: Value) -> Self {
        let trade_state = string_field(&document, "trade_state");
        Self {
            transaction_no: transaction_no.to_string(),
            gateway_order_no: string_field(&document, "transaction_id"),
            status: PaymentStatus::from_trade_state(&trade_state),
            trade_state,
            status_detail: string_field(&document, "trade_state_desc"),
            payment_method: PAYMENT_METHOD_WECHAT.to_string(),
            raw_payload: document,
            error: None,
        }
    }

    /// 状态未知 (通常是查单失败)
    pub fn unknown(transaction_no: &str, error: impl Into<String>) -> Self {
        Self {
            transaction_no: transaction_no.to_string(),
            gateway_order_no: String::new(),
            status: PaymentStatus::Unknown,
            trade_state: String::new(),
            status_detail: String::new(),
            payment_method: PAYMENT_METHOD_WECHAT.to_string(),
            raw_payload: Value::Null,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PaymentStatus::Success
    }

    /// 转换为Web端约定的载荷格式
    pub fn to_payload(&self) -> RelayPayload {
        RelayPayload {
            state: self.trade_state.clone(),
            state_desc: self.status_detail.clone(),
            err: self.error.clone().unwrap_or_default(),
            is_success: self.is_success(),
            trans_no: self.transaction_no.clone(),
            refund_no: String::new(),
            payment_method: self.payment_method.clone(),
            pay_no: self.gateway_order_no.clone(),
            raw: self.raw_payload.clone(),
        }
    }
}

/// 推送给Web端的状态载荷
///
/// 字段名与Web端 `/api/payment/notify_state` 接口保持一致，空字符串字段不输出
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayPayload {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state_desc: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub err: String,
    pub is_success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trans_no: String,
    /// 退款号，和支付号只会有一个不为空
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refund_no: String,
    pub payment_method: String,
    /// 第三方订单号
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pay_no: String,
    pub raw: Value,
}

fn string_field(document: &Value, key: &str) -> String {
    document
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
