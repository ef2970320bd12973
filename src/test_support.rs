// 测试辅助
// 固定的密钥与报文样本、网关桩、通知记录器，以及组装好的应用状态

use actix_web::web;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::errors::GatewayError;
use crate::models::{NotifyResource, OrderParams, PaymentAccount, PaymentRecord, PaymentState, StoreContext};
use crate::services::gateway::{MerchantCredentials, PlatformCertificate};
use crate::services::{InMemoryStore, Notifier, PaymentGateway};
use crate::state::AppState;
use crate::utils::{load_certificate_public_key, sign_sha256_rsa};

/// 商户API私钥
pub const MERCHANT_KEY_PEM: &str = include_str!("../testdata/merchant_key.pem");
/// 模拟的微信支付平台私钥，用于构造带签名的回包
pub const PLATFORM_KEY_PEM: &str = include_str!("../testdata/platform_key.pem");
pub const PLATFORM_PUB_PEM: &str = include_str!("../testdata/platform_pub.pem");
/// 由平台私钥自签的平台证书
pub const PLATFORM_CERT_PEM: &str = include_str!("../testdata/platform_cert.pem");
pub const PLATFORM_CERT_SERIAL: &str = "5FB4AC2F66F2E1F5A3E1F08F1E7B5C1D2E3F4A5B";
/// 用 TEST_API_V3_KEY 加密的平台证书，附加数据 "certificate"，随机串 "c5ac7061fccf"
pub const PLATFORM_CERT_CIPHERTEXT: &str = include_str!("../testdata/platform_cert_ciphertext.txt");
/// 用 TEST_API_V3_KEY 加密的通知资源，附加数据 "transaction"，随机串 "fjGcD1Rz6h3k"
pub const NOTIFY_CIPHERTEXT: &str = include_str!("../testdata/notify_ciphertext.txt");
pub const NOTIFY_PLAINTEXT: &str = include_str!("../testdata/notify_plaintext.json");
/// 调起支付签名串及其在商户私钥下的签名
pub const PAY_SIGN_MESSAGE: &str = include_str!("../testdata/pay_sign_message.txt");
pub const PAY_SIGN_EXPECTED: &str = include_str!("../testdata/pay_sign_expected.txt");
pub const TEST_API_V3_KEY: &str = "0123456789abcdef0123456789abcdef";

/// 普通商户模式的测试账号
pub fn sample_account(id: i64) -> PaymentAccount {
    PaymentAccount {
        id,
        account_type: "wechat".to_string(),
        name: "test merchant".to_string(),
        mer_id: "1900000109".to_string(),
        app_id: String::new(),
        api_v3_secret: TEST_API_V3_KEY.to_string(),
        cert_serial_number: "5157F09EFDC096DE15EBE81A47057A72".to_string(),
        cert_private: MERCHANT_KEY_PEM.to_string(),
    }
}

/// 不过期的平台证书
pub fn platform_certificate() -> PlatformCertificate {
    PlatformCertificate {
        serial_no: PLATFORM_CERT_SERIAL.to_string(),
        expire_time: None,
        public_key: load_certificate_public_key(PLATFORM_CERT_PEM).unwrap(),
    }
}

pub fn sample_record(trans_no: &str, status: &str) -> PaymentRecord {
    PaymentRecord {
        id: 1,
        trans_no: trans_no.to_string(),
        payment_account_id: 3,
        pay_no: None,
        status: status.to_string(),
        store_id: Some(21),
        addi_notify_url: None,
    }
}

/// 网关错误不可克隆，桩按需重新构造同样的错误
fn replay_error(error: &GatewayError) -> GatewayError {
    match error {
        GatewayError::Api { status, body } => GatewayError::Api {
            status: *status,
            body: body.clone(),
        },
        GatewayError::Credential(msg) => GatewayError::Credential(msg.clone()),
        GatewayError::Decrypt(msg) => GatewayError::Decrypt(msg.clone()),
        GatewayError::Sign(msg) => GatewayError::Sign(msg.clone()),
        GatewayError::Protocol(msg) => GatewayError::Protocol(msg.clone()),
        other => GatewayError::Protocol(other.to_string()),
    }
}

fn replay(response: &Result<Value, GatewayError>) -> Result<Value, GatewayError> {
    match response {
        Ok(value) => Ok(value.clone()),
        Err(e) => Err(replay_error(e)),
    }
}

/// 网关桩
///
/// 解密返回预设明文，未设置时解密失败；下单和查单返回预设回包，未设置时返回协议错误。
/// 证书下载默认返回测试平台证书，签名使用真实的商户私钥。
pub struct MockGateway {
    certificates_available: bool,
    plaintext: Option<String>,
    create_response: Option<Result<Value, GatewayError>>,
    query_response: Option<Result<Value, GatewayError>>,
    certificate_calls: AtomicUsize,
    decrypt_calls: AtomicUsize,
    query_calls: AtomicUsize,
    create_calls: AtomicUsize,
    last_order: Mutex<Option<OrderParams>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            certificates_available: true,
            plaintext: None,
            create_response: None,
            query_response: None,
            certificate_calls: AtomicUsize::new(0),
            decrypt_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            last_order: Mutex::new(None),
        }
    }

    /// 证书下载返回接口错误
    pub fn without_certificates(mut self) -> Self {
        self.certificates_available = false;
        self
    }

    pub fn with_plaintext(mut self, plaintext: Option<&str>) -> Self {
        self.plaintext = plaintext.map(str::to_string);
        self
    }

    pub fn with_create_response(mut self, response: Result<Value, GatewayError>) -> Self {
        self.create_response = Some(response);
        self
    }

    pub fn with_query_response(mut self, response: Result<Value, GatewayError>) -> Self {
        self.query_response = Some(response);
        self
    }

    pub fn certificate_calls(&self) -> usize {
        self.certificate_calls.load(Ordering::SeqCst)
    }

    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// 最近一次下单的参数
    pub fn last_order(&self) -> Option<OrderParams> {
        self.last_order.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn download_platform_certificates(
        &self,
        _credentials: &MerchantCredentials,
    ) -> Result<Vec<PlatformCertificate>, GatewayError> {
        self.certificate_calls.fetch_add(1, Ordering::SeqCst);
        if self.certificates_available {
            Ok(vec![platform_certificate()])
        } else {
            Err(GatewayError::Api {
                status: 401,
                body: r#"{"code":"SIGN_ERROR"}"#.to_string(),
            })
        }
    }

    async fn create_order(
        &self,
        _credentials: &MerchantCredentials,
        _platform: &[PlatformCertificate],
        _store: Option<&StoreContext>,
        params: &OrderParams,
    ) -> Result<Value, GatewayError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_order.lock().unwrap() = Some(params.clone());
        match &self.create_response {
            Some(response) => replay(response),
            None => Err(GatewayError::Protocol("no create response".to_string())),
        }
    }

    async fn query_order_state(
        &self,
        _credentials: &MerchantCredentials,
        _platform: &[PlatformCertificate],
        _store: Option<&StoreContext>,
        _trans_no: &str,
    ) -> Result<Value, GatewayError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        match &self.query_response {
            Some(response) => replay(response),
            None => Err(GatewayError::Protocol("no query response".to_string())),
        }
    }

    fn decrypt_notification(
        &self,
        _credentials: &MerchantCredentials,
        _resource: &NotifyResource,
    ) -> Result<String, GatewayError> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.plaintext
            .clone()
            .ok_or_else(|| GatewayError::Decrypt("cipher: message authentication failed".to_string()))
    }

    fn sign_message(&self, credentials: &MerchantCredentials, message: &str) -> Result<String, GatewayError> {
        sign_sha256_rsa(&credentials.private_key, message)
    }
}

/// 记录每次分发的通知，不做投递
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, PaymentState)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, PaymentState)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn dispatch(&self, target: &str, state: &PaymentState) {
        self.sent.lock().unwrap().push((target.to_string(), state.clone()));
    }
}

/// 默认配置下的应用状态
///
/// 预置账号3、店铺21和处理中的支付记录 T20240001
pub async fn test_state(gateway: MockGateway) -> (web::Data<AppState>, InMemoryStore, Arc<RecordingNotifier>) {
    let store = InMemoryStore::new();
    store.insert_account(sample_account(3)).await;
    store
        .insert_store(StoreContext {
            id: 21,
            wechat_payment_mer_id: "1900000110".to_string(),
        })
        .await;
    store.insert_record(sample_record("T20240001", "pending")).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState::from_parts(
        Config::default(),
        Arc::new(store.clone()),
        Arc::new(gateway),
        notifier.clone(),
    );

    (web::Data::new(state), store, notifier)
}
