// 订单状态查询服务
// 主动向网关查询订单状态，与对账共用同一个状态映射

use std::sync::Arc;

use super::credential_cache::CredentialCache;
use super::gateway::{MerchantCredentials, PaymentGateway};
use super::store::PaymentStore;
use crate::errors::OrderError;
use crate::models::{PaymentState, StateCheckRequest, StoreContext};
use crate::utils::{parse_id, validate_trans_no};

pub struct OrderStatePoller {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    credentials: Arc<CredentialCache>,
}

impl OrderStatePoller {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        credentials: Arc<CredentialCache>,
    ) -> Self {
        Self {
            store,
            gateway,
            credentials,
        }
    }

    /// 查询订单状态
    ///
    /// 证书获取或查询失败不返回错误，而是返回带错误信息的 `Unknown` 状态
    pub async fn poll(
        &self,
        credentials: &MerchantCredentials,
        store: Option<&StoreContext>,
        trans_no: &str,
    ) -> PaymentState {
        let platform = match self
            .credentials
            .platform_certificates(self.gateway.as_ref(), credentials)
            .await
        {
            Ok(platform) => platform,
            Err(e) => {
                log::warn!("wechat, load platform cert for trans_no {} error: {}", trans_no, e);
                return PaymentState::unknown(trans_no, format!("wechat, load platform cert error: {}", e));
            }
        };

        match self
            .gateway
            .query_order_state(credentials, &platform, store, trans_no)
            .await
        {
            Ok(document) => {
                log::info!("wechat, trans_no {} state check rsp: {}", trans_no, document);
                PaymentState::from_gateway_document(trans_no, document)
            }
            Err(e) => {
                log::warn!("wechat, get trans_no {} state error: {}", trans_no, e);
                PaymentState::unknown(trans_no, format!("wechat, get trans_no state error: {}", e))
            }
        }
    }

    /// 处理Web端的查单请求
    ///
    /// 账号加载失败返回错误；店铺不存在时按普通商户处理
    pub async fn check(&self, request: &StateCheckRequest) -> Result<PaymentState, OrderError> {
        validate_trans_no(&request.trans_no).map_err(|e| OrderError::InvalidRequest(e.to_string()))?;
        let account_id = parse_id("payment_account_id", &request.payment_account_id)
            .map_err(|e| OrderError::InvalidRequest(e.to_string()))?;

        let credentials = self
            .credentials
            .get_or_load(self.store.as_ref(), account_id)
            .await
            .map_err(|source| OrderError::Account {
                id: request.payment_account_id.clone(),
                source,
            })?;

        let store = match parse_id("store_id", &request.store_id) {
            Ok(store_id) => self.store.find_store(store_id).await?,
            Err(_) => None,
        };

        Ok(self.poll(&credentials, store.as_ref(), &request.trans_no).await)
    }
}
