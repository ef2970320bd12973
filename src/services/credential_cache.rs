// 商户凭证缓存
// 按支付账号ID缓存解码后的商户私钥和下载的平台证书，进程内共享

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

use super::gateway::{MerchantCredentials, PaymentGateway, PlatformCertificate};
use super::store::PaymentStore;
use crate::errors::{CredentialError, GatewayError};

#[derive(Default)]
pub struct CredentialCache {
    entries: DashMap<i64, Arc<MerchantCredentials>>,
    platform: DashMap<i64, Arc<Vec<PlatformCertificate>>>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取账号凭证，缓存未命中时从存储加载并解码
    ///
    /// 并发未命中时可能重复解码，以先写入的为准。商户私钥不做失效
    pub async fn get_or_load(
        &self,
        store: &dyn PaymentStore,
        account_id: i64,
    ) -> Result<Arc<MerchantCredentials>, CredentialError> {
        if let Some(entry) = self.entries.get(&account_id) {
            return Ok(Arc::clone(entry.value()));
        }

        let account = store
            .find_account(account_id)
            .await?
            .ok_or(CredentialError::NotFound(account_id))?;
        let credentials = Arc::new(MerchantCredentials::load(account)?);

        log::info!("loaded credentials for payment account {}", account_id);

        let entry = self.entries.entry(account_id).or_insert(credentials);
        Ok(Arc::clone(entry.value()))
    }

    /// 获取账号的平台证书
    ///
    /// 缓存中的证书全部过期后重新下载，下载失败不缓存
    pub async fn platform_certificates(
        &self,
        gateway: &dyn PaymentGateway,
        credentials: &MerchantCredentials,
    ) -> Result<Arc<Vec<PlatformCertificate>>, GatewayError> {
        let account_id = credentials.account.id;
        let now = Utc::now();
        if let Some(entry) = self.platform.get(&account_id) {
            if entry.iter().any(|certificate| certificate.is_valid_at(now)) {
                return Ok(Arc::clone(entry.value()));
            }
        }

        let certificates = gateway.download_platform_certificates(credentials).await?;
        if certificates.is_empty() {
            return Err(GatewayError::Protocol("platform cert is 0".to_string()));
        }

        let certificates = Arc::new(certificates);
        self.platform.insert(account_id, Arc::clone(&certificates));
        Ok(certificates)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
