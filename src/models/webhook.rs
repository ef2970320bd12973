// 微信支付通知数据模型
// 定义支付结果通知报文和给微信的应答格式

use serde::{Deserialize, Serialize};

/// 支付结果通知报文
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayNotification {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub resource_type: String,
    pub resource: NotifyResource,
}

/// 通知中的加密资源
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyResource {
    pub ciphertext: String,
    pub nonce: String,
    #[serde(default)]
    pub associated_data: String,
}

/// 给微信的通知应答
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebhookAck {
    pub code: &'static str,
    pub message: &'static str,
}

impl WebhookAck {
    /// 接收成功，微信不再重发
    pub fn success() -> Self {
        Self {
            code: "SUCCESS",
            message: "成功",
        }
    }
}

/// 处理失败的应答，配合非2xx状态码让微信按自己的策略重发
#[derive(Debug, Clone, Serialize)]
pub struct WebhookFailure {
    pub code: &'static str,
    pub message: String,
}

impl WebhookFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: "FAIL",
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_notification() {
        let body = json!({
            "id": "EV-2018022511223320873",
            "create_time": "2015-05-20T13:29:35+08:00",
            "resource_type": "encrypt-resource",
            "event_type": "TRANSACTION.SUCCESS",
            "summary": "支付成功",
            "resource": {
                "original_type": "transaction",
                "algorithm": "AEAD_AES_256_GCM",
                "ciphertext": "abc",
                "associated_data": "transaction",
                "nonce": "fjGcD1Rz6h3k"
            }
        });
        let notification: GatewayNotification = serde_json::from_value(body).unwrap();
        assert_eq!(notification.event_type, "TRANSACTION.SUCCESS");
        assert_eq!(notification.resource.nonce, "fjGcD1Rz6h3k");
        assert_eq!(notification.resource.associated_data, "transaction");
    }

    #[test]
    fn test_ack_shape() {
        let ack = serde_json::to_value(WebhookAck::success()).unwrap();
        assert_eq!(ack, json!({"code": "SUCCESS", "message": "成功"}));
    }
}
