// 错误类型定义
// 按组件划分的错误分类，HTTP层据此决定返回给调用方的响应形态

use thiserror::Error;

/// 支付网关 (微信支付) 调用错误
#[derive(Error, Debug)]
pub enum GatewayError {
    /// 网络请求失败
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// 网关返回非2xx状态码
    #[error("gateway api error, code: {status}, body: {body}")]
    Api { status: u16, body: String },
    /// 回包签名或结构无法校验，回包内容不可信
    #[error("gateway protocol error: {0}")]
    Protocol(String),
    /// 商户证书/密钥加载失败
    #[error("credential error: {0}")]
    Credential(String),
    /// 通知密文解密失败
    #[error("decrypt error: {0}")]
    Decrypt(String),
    /// 签名失败
    #[error("sign error: {0}")]
    Sign(String),
}

/// 存储层错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// 支付账号加载错误
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("not found with payment account id: {0}")]
    NotFound(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("load pri cert error: {0}")]
    Key(#[from] GatewayError),
}

/// Webhook对账错误
///
/// 这些错误都发生在确认应答之前，会同步返回给HTTP层
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("invalid trans_no in notify url: {0}")]
    InvalidTransNo(String),
    #[error("not found payment record, trans_no: {0}")]
    NotFound(String),
    #[error("load pa error: {0}")]
    AccountLoad(#[source] CredentialError),
    #[error("decode wechat payment notify data error: {0}")]
    Decrypt(#[source] GatewayError),
    #[error("invalid payment notify payload: {0}")]
    Payload(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    /// 网关重新投递是否可能成功
    ///
    /// 订单号非法或找不到支付记录时重试没有意义，其余错误交给网关自己的重发策略
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ReconcileError::NotFound(_) | ReconcileError::InvalidTransNo(_))
    }
}

/// 单次通知投递失败
#[derive(Error, Debug)]
pub enum RelayDeliveryError {
    #[error("send to web err: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("send to web err: {body}, code: {status}")]
    Rejected { status: u16, body: String },
    #[error("web replied {0:?} instead of \"ok\"")]
    UnexpectedBody(String),
    #[error("sign relay payload err: {0}")]
    Sign(#[source] GatewayError),
    #[error("invalid relay header: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

/// 下单/查单错误
#[derive(Error, Debug)]
pub enum OrderError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("err to find payment account with id: {id}, err: {source}")]
    Account {
        id: String,
        #[source]
        source: CredentialError,
    },
    #[error("not found store with id: {0}")]
    StoreNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("prepay_id is empty")]
    MissingPrepayId,
    #[error("code_url is empty, rsp: {0}")]
    MissingCodeUrl(String),
    #[error("build pay params error: {0}")]
    PayParams(#[source] GatewayError),
}
