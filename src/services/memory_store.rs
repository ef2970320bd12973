// 内存存储
// 线程安全的 PaymentStore 实现，仅用于测试

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::store::PaymentStore;
use crate::errors::StoreError;
use crate::models::{PaymentAccount, PaymentRecord, StoreContext};

#[derive(Default)]
struct Tables {
    records: HashMap<String, PaymentRecord>,
    accounts: HashMap<i64, PaymentAccount>,
    stores: HashMap<i64, StoreContext>,
}

/// 内存存储，`Arc<RwLock<..>>` 共享，clone 后指向同一份数据
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_record(&self, record: PaymentRecord) {
        let mut tables = self.tables.write().await;
        tables.records.insert(record.trans_no.clone(), record);
    }

    pub async fn insert_account(&self, account: PaymentAccount) {
        let mut tables = self.tables.write().await;
        tables.accounts.insert(account.id, account);
    }

    pub async fn insert_store(&self, store: StoreContext) {
        let mut tables = self.tables.write().await;
        tables.stores.insert(store.id, store);
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn find_record(&self, trans_no: &str) -> Result<Option<PaymentRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.records.get(trans_no).cloned())
    }

    async fn mark_record_terminal(&self, trans_no: &str, status: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.records.get_mut(trans_no) {
            Some(record) if !record.is_terminal() => {
                record.status = status.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_account(&self, id: i64) -> Result<Option<PaymentAccount>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.get(&id).cloned())
    }

    async fn find_store(&self, id: i64) -> Result<Option<StoreContext>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.stores.get(&id).cloned())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_record;

    #[tokio::test]
    async fn test_mark_record_terminal_is_conditional() {
        let store = InMemoryStore::new();
        store.insert_record(sample_record("T20240001", "pending")).await;

        assert!(store.mark_record_terminal("T20240001", "success").await.unwrap());
        assert!(!store.mark_record_terminal("T20240001", "failed").await.unwrap());

        let record = store.find_record("T20240001").await.unwrap().unwrap();
        assert_eq!(record.status, "success");
    }

    #[tokio::test]
    async fn test_mark_missing_record() {
        let store = InMemoryStore::new();
        assert!(!store.mark_record_terminal("T404404", "success").await.unwrap());
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let store = InMemoryStore::new();
        let clone = store.clone();
        clone
            .insert_store(StoreContext {
                id: 21,
                wechat_payment_mer_id: "1900000110".to_string(),
            })
            .await;

        let found = store.find_store(21).await.unwrap().unwrap();
        assert_eq!(found.wechat_payment_mer_id, "1900000110");
        assert!(store.find_store(22).await.unwrap().is_none());
    }
}
