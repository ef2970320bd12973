// 支付结果通知对账服务
// 校验微信的支付结果通知，转换为内部支付状态，每个终态只触发一次转发

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::credential_cache::CredentialCache;
use super::gateway::PaymentGateway;
use super::relay_service::Notifier;
use super::store::PaymentStore;
use crate::errors::ReconcileError;
use crate::models::{record_status_for, GatewayNotification, PaymentState, WebhookAck};
use crate::utils::validate_trans_no;

/// 按商户订单号加锁
///
/// 同一订单的通知串行处理，无人持有或等待的锁项随即移除
#[derive(Default)]
pub struct TransactionLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TransactionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, trans_no: &str) -> TransactionGuard<'_> {
        let mutex = Arc::clone(
            self.locks
                .entry(trans_no.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let guard = mutex.lock_owned().await;

        TransactionGuard {
            locks: self,
            trans_no: trans_no.to_string(),
            guard: Some(guard),
        }
    }

    /// 当前锁表中的订单数
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

pub struct TransactionGuard<'a> {
    locks: &'a TransactionLocks,
    trans_no: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        // 先释放锁，再检查是否还有其他持有者
        self.guard.take();
        self.locks
            .locks
            .remove_if(&self.trans_no, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// 支付结果通知对账
pub struct WebhookReconciler {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    credentials: Arc<CredentialCache>,
    notifier: Arc<dyn Notifier>,
    locks: TransactionLocks,
    /// Web端接收状态的路径
    notify_path: String,
}

impl WebhookReconciler {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        credentials: Arc<CredentialCache>,
        notifier: Arc<dyn Notifier>,
        notify_path: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            credentials,
            notifier,
            locks: TransactionLocks::new(),
            notify_path: notify_path.into(),
        }
    }

    /// 处理一次支付结果通知
    ///
    /// # Arguments
    /// * `trans_no` - 通知地址中的商户订单号
    /// * `body` - 通知原始报文
    ///
    /// # Returns
    /// * 给微信的应答；确认应答前发生的错误同步返回
    pub async fn reconcile(&self, trans_no: &str, body: &[u8]) -> Result<WebhookAck, ReconcileError> {
        // 非法订单号不占锁表
        validate_trans_no(trans_no).map_err(|_| ReconcileError::InvalidTransNo(trans_no.to_string()))?;
        let _guard = self.locks.lock(trans_no).await;

        let record = self
            .store
            .find_record(trans_no)
            .await?
            .ok_or_else(|| ReconcileError::NotFound(trans_no.to_string()))?;

        if record.is_terminal() {
            log::info!(
                "payment record {} is already {}, ack duplicate notify",
                trans_no,
                record.status
            );
            return Ok(WebhookAck::success());
        }

        let notification: GatewayNotification =
            serde_json::from_slice(body).map_err(|e| ReconcileError::Payload(e.to_string()))?;

        let credentials = self
            .credentials
            .get_or_load(self.store.as_ref(), record.payment_account_id)
            .await
            .map_err(ReconcileError::AccountLoad)?;

        let plaintext = self
            .gateway
            .decrypt_notification(&credentials, &notification.resource)
            .map_err(ReconcileError::Decrypt)?;
        let document: Value =
            serde_json::from_str(&plaintext).map_err(|e| ReconcileError::Payload(e.to_string()))?;

        let state = PaymentState::from_gateway_document(trans_no, document);
        log::info!(
            "wechat notify, trans_no: {}, event: {}, trade_state: {}, status: {:?}",
            trans_no,
            notification.event_type,
            state.trade_state,
            state.status
        );

        if let Some(status) = record_status_for(state.status) {
            if !self.store.mark_record_terminal(trans_no, status).await? {
                log::info!("payment record {} was finalized concurrently, skip relay", trans_no);
                return Ok(WebhookAck::success());
            }
        }

        self.notifier.dispatch(&self.notify_path, &state);
        if let Some(url) = record.additional_notify_url() {
            self.notifier.dispatch(url, &state);
        }

        Ok(WebhookAck::success())
    }
}
