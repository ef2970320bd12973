// 数据验证工具函数
// 提供下单参数和通知地址的格式检查

use anyhow::Result;

/// 商户订单号最短长度
const TRANS_NO_MIN_LEN: usize = 6;
/// 商户订单号最长长度
const TRANS_NO_MAX_LEN: usize = 32;

/// 验证商户订单号格式
///
/// # Arguments
/// * `trans_no` - 商户订单号，6-32个字符，只能是数字、大小写字母和 `_-|*`
pub fn validate_trans_no(trans_no: &str) -> Result<()> {
    if trans_no.is_empty() {
        anyhow::bail!("trans_no cannot be empty");
    }

    let len = trans_no.chars().count();
    if !(TRANS_NO_MIN_LEN..=TRANS_NO_MAX_LEN).contains(&len) {
        anyhow::bail!(
            "trans_no must be {}-{} characters, got {}",
            TRANS_NO_MIN_LEN,
            TRANS_NO_MAX_LEN,
            len
        );
    }

    if !trans_no
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '|' | '*'))
    {
        anyhow::bail!("trans_no contains invalid characters: {}", trans_no);
    }

    Ok(())
}

/// 验证支付金额 (单位为分)
pub fn validate_total_price(total_price: i64) -> Result<()> {
    if total_price <= 0 {
        anyhow::bail!("total_price must be positive, got {}", total_price);
    }
    Ok(())
}

/// 验证URL格式
///
/// # Returns
/// * URL是否为 http/https 绝对地址
pub fn validate_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
            !host.is_empty() && !rest.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// 解析字符串形式的ID
///
/// Web端以字符串传递 store_id / payment_account_id
pub fn parse_id(field: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| anyhow::anyhow!("invalid {}: {:?}", field, value))
}
