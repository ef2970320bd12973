// 存储能力接口与 PostgreSQL 实现
// 支付记录、支付账号、店铺三张表都由Web端维护，这里只读，唯一的写入是对账时的终态条件更新

use async_trait::async_trait;
use sqlx::PgPool;

use crate::errors::StoreError;
use crate::models::{PaymentAccount, PaymentRecord, StoreContext};

/// 支付相关数据的存取
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// 按商户订单号查找支付记录
    async fn find_record(&self, trans_no: &str) -> Result<Option<PaymentRecord>, StoreError>;

    /// 将支付记录标记为终态
    ///
    /// 条件更新：只有记录当前不是终态时才写入。
    /// 返回 `true` 表示本次调用完成了状态迁移，`false` 表示已被其他请求抢先完成。
    async fn mark_record_terminal(&self, trans_no: &str, status: &str) -> Result<bool, StoreError>;

    /// 按ID查找支付账号
    async fn find_account(&self, id: i64) -> Result<Option<PaymentAccount>, StoreError>;

    /// 按ID查找店铺
    async fn find_store(&self, id: i64) -> Result<Option<StoreContext>, StoreError>;

    /// 存储是否可用
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// PostgreSQL 存储
#[derive(Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn find_record(&self, trans_no: &str) -> Result<Option<PaymentRecord>, StoreError> {
        let record = sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT id, trans_no, payment_account_id, pay_no, status, store_id, addi_notify_url
            FROM payment_records
            WHERE trans_no = $1
            "#,
        )
        .bind(trans_no)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn mark_record_terminal(&self, trans_no: &str, status: &str) -> Result<bool, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE payment_records
            SET status = $1, updated_at = NOW()
            WHERE trans_no = $2 AND status NOT IN ('success', 'failed')
            "#,
        )
        .bind(status)
        .bind(trans_no)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn find_account(&self, id: i64) -> Result<Option<PaymentAccount>, StoreError> {
        let account = sqlx::query_as::<_, PaymentAccount>(
            r#"
            SELECT id, account_type, name, mer_id, app_id, api_v3_secret,
                   cert_serial_number, cert_private
            FROM payment_accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn find_store(&self, id: i64) -> Result<Option<StoreContext>, StoreError> {
        let store = sqlx::query_as::<_, StoreContext>(
            "SELECT id, wechat_payment_mer_id FROM stores WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(store)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
