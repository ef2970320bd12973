// 支付中继数据模型定义
// 包含支付状态、支付记录、支付账号、微信通知等核心数据结构

mod order;
mod payment_account;
mod payment_record;
mod payment_state;
mod webhook;

// 重新导出核心类型
pub use order::*;
pub use payment_account::*;
pub use payment_record::*;
pub use payment_state::*;
pub use webhook::*;

use serde::Serialize;

/// 标准API响应格式
///
/// 成功: `{"status": "ok", "data": ...}`
/// 失败: `{"status": "error", "error": "..."}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// 响应状态 ("ok" | "error")
    pub status: &'static str,
    /// 响应数据
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// 错误信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            status: "ok",
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    /// 创建错误响应
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            data: None,
            error: Some(message.into()),
        }
    }
}
