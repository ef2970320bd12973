// 通知转发服务
// 将支付状态推送给Web端，失败按固定间隔重试，超过时间预算后放弃

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, Instant};
use uuid::Uuid;

use crate::errors::RelayDeliveryError;
use crate::models::PaymentState;
use crate::utils::generate_hmac_signature;

/// Web端处理成功时必须返回的响应体
pub const RELAY_ACK_BODY: &str = "ok";

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelayPolicy {
    /// 两次尝试之间的等待时间
    pub retry_interval: Duration,
    /// 从第一次尝试开始计算的总时间预算
    pub budget: Duration,
    /// 单次尝试的时间上限，不超过剩余预算
    pub attempt_timeout: Duration,
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(2),
            budget: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// 一次转发的最终结果
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    Delivered { attempts: u32 },
    GaveUp { attempts: u32, last_error: String },
}

/// 单次投递
#[async_trait]
pub trait DeliveryTransport: Send + Sync + 'static {
    async fn deliver(&self, relay_id: &str, target: &str, body: &str) -> Result<(), RelayDeliveryError>;
}

/// HTTP 投递，POST 到Web端
pub struct HttpTransport {
    client: Client,
    web_url: String,
    api_secret: String,
    api_secret_header: HeaderValue,
}

impl HttpTransport {
    /// 创建HTTP投递
    ///
    /// # Arguments
    /// * `web_url` - Web端地址，相对路径的目标基于它解析
    /// * `api_secret` - 与Web端约定的共享密钥
    /// * `timeout` - 单次请求超时
    ///
    /// 密钥不能作为请求头的值时返回 `InvalidHeader`
    pub fn new(web_url: &str, api_secret: &str, timeout: Duration) -> Result<Self, RelayDeliveryError> {
        let mut api_secret_header = HeaderValue::from_str(api_secret)?;
        api_secret_header.set_sensitive(true);
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            web_url: web_url.trim_end_matches('/').to_string(),
            api_secret: api_secret.to_string(),
            api_secret_header,
        })
    }

    /// 不以 `http` 开头的目标视为Web端的相对路径
    pub fn resolve_url(&self, target: &str) -> String {
        if target.starts_with("http") {
            target.to_string()
        } else {
            format!("{}{}", self.web_url, target)
        }
    }
}

#[async_trait]
impl DeliveryTransport for HttpTransport {
    async fn deliver(&self, relay_id: &str, target: &str, body: &str) -> Result<(), RelayDeliveryError> {
        let signature = generate_hmac_signature(body, &self.api_secret).map_err(RelayDeliveryError::Sign)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("wxpay-relay/1.0"));
        headers.insert("x_api_secret", self.api_secret_header.clone());
        headers.insert("x-relay-id", HeaderValue::from_str(relay_id)?);
        headers.insert("x-relay-signature", HeaderValue::from_str(&signature)?);

        let response = self
            .client
            .post(self.resolve_url(target))
            .headers(headers)
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(RelayDeliveryError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }
        if text != RELAY_ACK_BODY {
            return Err(RelayDeliveryError::UnexpectedBody(text));
        }

        Ok(())
    }
}

/// 状态变更通知的分发入口
///
/// 分发立即返回，投递在后台进行
pub trait Notifier: Send + Sync {
    fn dispatch(&self, target: &str, state: &PaymentState);
}

/// 通知转发
pub struct NotificationRelay<T> {
    transport: Arc<T>,
    policy: RelayPolicy,
}

impl<T> Clone for NotificationRelay<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            policy: self.policy,
        }
    }
}

impl<T: DeliveryTransport> NotificationRelay<T> {
    pub fn new(transport: T, policy: RelayPolicy) -> Self {
        Self {
            transport: Arc::new(transport),
            policy,
        }
    }

    /// 投递直到成功或超出时间预算
    ///
    /// 单次尝试受 `attempt_timeout` 和剩余预算共同限制，挂起的投递不会拖过预算
    ///
    /// # Arguments
    /// * `target` - 目标地址 (绝对地址或Web端相对路径)
    /// * `payload` - 已序列化的载荷
    ///
    /// # Returns
    /// * 最终结果，错误只记录日志不向外传播
    pub async fn relay(&self, target: &str, payload: &str) -> RelayOutcome {
        let relay_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut last_error = String::new();

        loop {
            let elapsed = started.elapsed();
            if elapsed >= self.policy.budget {
                log::error!(
                    "relay {} to {} gave up after {} attempts, last err: {}, payload: {}",
                    relay_id,
                    target,
                    attempts,
                    last_error,
                    payload
                );
                return RelayOutcome::GaveUp { attempts, last_error };
            }

            attempts += 1;
            let limit = self.policy.attempt_timeout.min(self.policy.budget - elapsed);
            match timeout(limit, self.transport.deliver(&relay_id, target, payload)).await {
                Ok(Ok(())) => {
                    log::info!("relay {} to {} delivered after {} attempts", relay_id, target, attempts);
                    return RelayOutcome::Delivered { attempts };
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("attempt timed out after {:?}", limit),
            }
            log::warn!(
                "relay {} to {} attempt {} failed: {}, retrying in {:?}",
                relay_id,
                target,
                attempts,
                last_error,
                self.policy.retry_interval
            );

            let remaining = self.policy.budget.saturating_sub(started.elapsed());
            sleep(self.policy.retry_interval.min(remaining)).await;
        }
    }

    /// 在后台任务中转发
    pub fn spawn(&self, target: String, payload: String) -> JoinHandle<RelayOutcome> {
        let relay = self.clone();
        tokio::spawn(async move { relay.relay(&target, &payload).await })
    }
}

impl<T: DeliveryTransport> Notifier for NotificationRelay<T> {
    fn dispatch(&self, target: &str, state: &PaymentState) {
        match serde_json::to_string(&state.to_payload()) {
            Ok(payload) => {
                self.spawn(target.to_string(), payload);
            }
            Err(e) => log::error!(
                "serialize relay payload for trans_no {} err: {}",
                state.transaction_no,
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// 前 `failures` 次投递失败的模拟投递
    struct FlakyTransport {
        calls: AtomicU32,
        failures: u32,
    }

    impl FlakyTransport {
        fn new(failures: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
            }
        }
    }

    #[async_trait]
    impl DeliveryTransport for FlakyTransport {
        async fn deliver(&self, _relay_id: &str, _target: &str, _body: &str) -> Result<(), RelayDeliveryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(RelayDeliveryError::Rejected {
                    status: 502,
                    body: "bad gateway".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    /// 每次投递都挂起一分钟的模拟投递
    struct HangingTransport {
        calls: AtomicU32,
    }

    #[async_trait]
    impl DeliveryTransport for HangingTransport {
        async fn deliver(&self, _relay_id: &str, _target: &str, _body: &str) -> Result<(), RelayDeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_secs(60)).await;
            Err(RelayDeliveryError::UnexpectedBody(String::new()))
        }
    }

    fn quick_policy() -> RelayPolicy {
        RelayPolicy {
            retry_interval: Duration::from_millis(20),
            budget: Duration::from_millis(200),
            attempt_timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_target_gives_up_within_budget() {
        let relay = NotificationRelay::new(FlakyTransport::new(u32::MAX), RelayPolicy::default());
        let started = Instant::now();

        let outcome = relay.relay("/api/payment/notify_state", "{}").await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(30), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(32), "elapsed {:?}", elapsed);
        match outcome {
            RelayOutcome::GaveUp { attempts, last_error } => {
                assert!(attempts >= 10, "attempts {}", attempts);
                assert_eq!(attempts, 15);
                assert!(last_error.contains("502"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_target_still_gives_up_within_budget() {
        let transport = HangingTransport {
            calls: AtomicU32::new(0),
        };
        let relay = NotificationRelay::new(transport, RelayPolicy::default());
        let started = Instant::now();

        let outcome = relay.relay("/api/payment/notify_state", "{}").await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(30), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(32), "elapsed {:?}", elapsed);
        // 0-10s、12-22s 各超时一次，第三次只剩 6s 预算
        match outcome {
            RelayOutcome::GaveUp { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "attempt timed out after 6s");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(relay.transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_delivered() {
        let relay = NotificationRelay::new(FlakyTransport::new(2), RelayPolicy::default());
        let started = Instant::now();

        let outcome = relay.relay("/api/payment/notify_state", "{}").await;

        assert_eq!(outcome, RelayOutcome::Delivered { attempts: 3 });
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(4) && elapsed < Duration::from_secs(5), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_spawned_relay_reports_outcome() {
        let relay = NotificationRelay::new(FlakyTransport::new(0), quick_policy());
        let outcome = relay
            .spawn("/api/payment/notify_state".to_string(), "{}".to_string())
            .await
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Delivered { attempts: 1 });
    }

    #[test]
    fn test_resolve_url() {
        let transport = HttpTransport::new("http://localhost:5010/", "secret", Duration::from_secs(1)).unwrap();
        assert_eq!(
            transport.resolve_url("/api/payment/notify_state"),
            "http://localhost:5010/api/payment/notify_state"
        );
        assert_eq!(
            transport.resolve_url("https://partner.example.com/notify"),
            "https://partner.example.com/notify"
        );
    }

    #[test]
    fn test_secret_must_be_a_header_value() {
        let result = HttpTransport::new("http://localhost:5010", "line\nbreak", Duration::from_secs(1));
        assert!(matches!(result, Err(RelayDeliveryError::InvalidHeader(_))));
    }

    #[tokio::test]
    async fn test_http_delivery_with_ok_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/payment/notify_state"))
            .and(header("X_API_SECRET", "web-secret"))
            .and(header_exists("X-Relay-Id"))
            .and(header_exists("X-Relay-Signature"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri(), "web-secret", Duration::from_secs(5)).unwrap();
        let relay = NotificationRelay::new(transport, quick_policy());
        let payload = json!({"trans_no": "T20240001", "is_success": true}).to_string();

        let outcome = relay.relay("/api/payment/notify_state", &payload).await;
        assert_eq!(outcome, RelayOutcome::Delivered { attempts: 1 });
    }

    #[tokio::test]
    async fn test_uppercase_ok_is_not_an_ack() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/payment/notify_state"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri(), "web-secret", Duration::from_secs(5)).unwrap();
        let relay = NotificationRelay::new(transport, quick_policy());

        match relay.relay("/api/payment/notify_state", "{}").await {
            RelayOutcome::GaveUp { attempts, .. } => assert!(attempts >= 2, "attempts {}", attempts),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let err = relay
            .transport
            .deliver("relay-1", "/api/payment/notify_state", "{}")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "web replied \"OK\" instead of \"ok\"");
    }

    #[tokio::test]
    async fn test_non_2xx_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("ok"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri(), "web-secret", Duration::from_secs(5)).unwrap();
        let result = transport.deliver("relay-1", "/api/payment/notify_state", "{}").await;
        assert!(matches!(result, Err(RelayDeliveryError::Rejected { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_signature_header_matches_body() {
        let server = MockServer::start().await;
        let body = r#"{"trans_no":"T20240001"}"#;
        let signature = generate_hmac_signature(body, "web-secret").unwrap();
        Mock::given(method("POST"))
            .and(header("X-Relay-Signature", signature.as_str()))
            .and(header("X-Relay-Id", "relay-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri(), "web-secret", Duration::from_secs(5)).unwrap();
        assert!(transport.deliver("relay-1", "/notify", body).await.is_ok());
    }
}
