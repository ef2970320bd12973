// 服务层模块
// 包含网关客户端、对账、转发、查单、下单等业务逻辑服务

pub mod credential_cache;
pub mod gateway;
#[cfg(test)]
pub mod memory_store;
pub mod order_service;
pub mod poll_service;
pub mod reconcile_service;
pub mod relay_service;
pub mod store;
pub mod wechat_client;

// 重新导出服务
pub use credential_cache::CredentialCache;
pub use gateway::PaymentGateway;
#[cfg(test)]
pub use memory_store::InMemoryStore;
pub use order_service::OrderService;
pub use poll_service::OrderStatePoller;
pub use reconcile_service::WebhookReconciler;
pub use relay_service::{HttpTransport, NotificationRelay, Notifier};
pub use store::{PaymentStore, PgPaymentStore};
pub use wechat_client::WechatPayClient;
