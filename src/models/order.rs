// 下单与查单请求数据模型
// Web端调用本服务时使用的请求体，以及发往网关的统一下单参数

use serde::{Deserialize, Serialize};

/// JSAPI/APP 支付来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayFrom {
    /// APP支付
    App,
    /// 小程序、公众号网页
    Mp,
}

/// 生成预支付信息请求
///
/// POST /wechat/gen_mp_prepay
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePrepayRequest {
    pub store_id: String,
    pub payment_account_id: String,
    /// 商户订单号，6-32个字符，只能是数字、大小写字母_-|*
    pub trans_no: String,
    /// 公众号、小程序或APP的app_id
    pub app_id: String,
    /// from == app 时没有此字段
    #[serde(default)]
    pub open_id: Option<String>,
    /// 商品描述
    pub desp: String,
    /// 总金额，单位为分
    pub total_price: i64,
    pub from: PayFrom,
}

/// Native支付 (扫码) 请求
///
/// POST /wechat/native_pay
#[derive(Debug, Clone, Deserialize)]
pub struct NativePayRequest {
    pub store_id: String,
    pub payment_account_id: String,
    pub trans_no: String,
    pub app_id: String,
    pub desp: String,
    /// 总金额，单位为分
    pub total_price: i64,
}

/// 查单请求
///
/// POST /wechat/payment_check
#[derive(Debug, Clone, Deserialize)]
pub struct StateCheckRequest {
    pub store_id: String,
    pub payment_account_id: String,
    pub trans_no: String,
}

/// 网关交易类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeType {
    Jsapi,
    App,
    Native,
}

impl TradeType {
    /// 对应下单接口的路径后缀
    pub fn path_segment(self) -> &'static str {
        match self {
            TradeType::Jsapi => "jsapi",
            TradeType::App => "app",
            TradeType::Native => "native",
        }
    }
}

impl From<PayFrom> for TradeType {
    fn from(from: PayFrom) -> Self {
        match from {
            PayFrom::App => TradeType::App,
            PayFrom::Mp => TradeType::Jsapi,
        }
    }
}

/// 统一下单参数，与具体网关无关
#[derive(Debug, Clone, PartialEq)]
pub struct OrderParams {
    pub trade_type: TradeType,
    pub trans_no: String,
    pub app_id: String,
    pub open_id: Option<String>,
    pub description: String,
    /// 单位为分
    pub total: i64,
    /// 支付结果通知地址
    pub notify_url: String,
}
