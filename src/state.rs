// 应用状态管理
// 包含配置、存储以及对账、查单、下单等服务，启动时显式构造后通过 web::Data 共享

use actix_web::web;
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::services::{
    CredentialCache, HttpTransport, NotificationRelay, Notifier, OrderService, OrderStatePoller, PaymentGateway,
    PaymentStore, PgPaymentStore, WebhookReconciler, WechatPayClient,
};

/// 应用全局状态
pub struct AppState {
    /// 应用配置
    pub config: Config,
    /// 支付数据存储
    pub store: Arc<dyn PaymentStore>,
    /// 支付结果通知对账
    pub reconciler: WebhookReconciler,
    /// 订单状态查询
    pub poller: OrderStatePoller,
    /// 下单
    pub orders: OrderService,
}

impl AppState {
    /// 创建新的应用状态实例
    ///
    /// # Arguments
    /// * `db_pool` - 数据库连接池
    /// * `config` - 应用配置
    ///
    /// # Returns
    /// * 应用状态实例
    pub fn new(db_pool: PgPool, config: Config) -> Result<Self> {
        let store: Arc<dyn PaymentStore> = Arc::new(PgPaymentStore::new(db_pool));

        let gateway: Arc<dyn PaymentGateway> = Arc::new(
            WechatPayClient::new(
                &config.gateway.api_base_url,
                Duration::from_secs(config.gateway.timeout),
            )
            .context("Failed to create wechat pay client")?,
        );

        let transport = HttpTransport::new(
            &config.web.url,
            &config.web.api_secret,
            Duration::from_secs(config.relay.timeout),
        )
        .context("Failed to create relay http client")?;
        let notifier: Arc<dyn Notifier> = Arc::new(NotificationRelay::new(transport, config.relay.policy()));

        Ok(Self::from_parts(config, store, gateway, notifier))
    }

    /// 由已构造的组件组装应用状态
    pub fn from_parts(
        config: Config,
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let credentials = Arc::new(CredentialCache::new());

        let reconciler = WebhookReconciler::new(
            store.clone(),
            gateway.clone(),
            credentials.clone(),
            notifier,
            config.web.notify_path.clone(),
        );
        let poller = OrderStatePoller::new(store.clone(), gateway.clone(), credentials.clone());
        let orders = OrderService::new(store.clone(), gateway, credentials, &config.gateway.self_api_url);

        Self {
            config,
            store,
            reconciler,
            poller,
            orders,
        }
    }
}

/// 应用状态数据类型别名
pub type AppStateData = web::Data<AppState>;
