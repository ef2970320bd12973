// 加密工具函数
// 提供商户私钥和平台证书加载、RSA-SHA256签名验签、AES-256-GCM解密、HMAC签名等安全功能

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::{distributions::Alphanumeric, Rng};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use x509_cert::der::{DecodePem, Encode};
use x509_cert::Certificate;

use crate::errors::GatewayError;

type HmacSha256 = Hmac<Sha256>;

/// AES-GCM 随机串长度
const GCM_NONCE_LEN: usize = 12;
/// APIv3 密钥长度
const API_V3_KEY_LEN: usize = 32;

/// 加载商户API私钥
///
/// 支持 PKCS#8 (`BEGIN PRIVATE KEY`) 和 PKCS#1 (`BEGIN RSA PRIVATE KEY`) 两种格式
pub fn load_private_key(pem: &str) -> Result<RsaPrivateKey, GatewayError> {
    let pem = pem.trim();
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| GatewayError::Credential(format!("load private key: {}", e)))
}

/// 从微信支付平台证书 (X.509 PEM) 中取出公钥
pub fn load_certificate_public_key(pem: &str) -> Result<RsaPublicKey, GatewayError> {
    let certificate = Certificate::from_pem(pem.trim().as_bytes())
        .map_err(|e| GatewayError::Credential(format!("load platform cert: {}", e)))?;
    let spki = certificate
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| GatewayError::Credential(format!("encode platform cert key: {}", e)))?;
    RsaPublicKey::from_public_key_der(&spki)
        .map_err(|e| GatewayError::Credential(format!("platform cert key is not rsa: {}", e)))
}

/// SHA256 with RSA 签名，返回 base64 编码的签名
pub fn sign_sha256_rsa(key: &RsaPrivateKey, message: &str) -> Result<String, GatewayError> {
    let signing_key = SigningKey::<Sha256>::new(key.clone());
    let signature = signing_key
        .try_sign(message.as_bytes())
        .map_err(|e| GatewayError::Sign(e.to_string()))?;
    Ok(STANDARD.encode(signature.to_bytes()))
}

/// 验证 SHA256 with RSA 签名
///
/// # Arguments
/// * `key` - 平台公钥
/// * `message` - 原始消息
/// * `signature` - base64 编码的签名
pub fn verify_sha256_rsa(key: &RsaPublicKey, message: &str, signature: &str) -> Result<(), GatewayError> {
    let raw = STANDARD
        .decode(signature.trim())
        .map_err(|e| GatewayError::Protocol(format!("signature is not base64: {}", e)))?;
    let signature = Signature::try_from(raw.as_slice())
        .map_err(|e| GatewayError::Protocol(format!("malformed signature: {}", e)))?;
    VerifyingKey::<Sha256>::new(key.clone())
        .verify(message.as_bytes(), &signature)
        .map_err(|_| GatewayError::Protocol("signature mismatch".to_string()))
}

/// 解密 AEAD_AES_256_GCM 密文
///
/// # Arguments
/// * `api_v3_key` - APIv3密钥 (32字节)
/// * `associated_data` - 附加数据
/// * `nonce` - 随机串 (12字节)
/// * `ciphertext` - base64 编码的密文 (含认证标签)
///
/// # Returns
/// * 解密后的明文字符串
pub fn decrypt_aes_256_gcm(
    api_v3_key: &str,
    associated_data: &str,
    nonce: &str,
    ciphertext: &str,
) -> Result<String, GatewayError> {
    if api_v3_key.len() != API_V3_KEY_LEN {
        return Err(GatewayError::Decrypt(format!(
            "api v3 key must be {} bytes, got {}",
            API_V3_KEY_LEN,
            api_v3_key.len()
        )));
    }
    if nonce.len() != GCM_NONCE_LEN {
        return Err(GatewayError::Decrypt(format!(
            "nonce must be {} bytes, got {}",
            GCM_NONCE_LEN,
            nonce.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(api_v3_key.as_bytes())
        .map_err(|e| GatewayError::Decrypt(e.to_string()))?;
    let data = STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| GatewayError::Decrypt(format!("ciphertext is not base64: {}", e)))?;

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce.as_bytes()),
            Payload {
                msg: &data,
                aad: associated_data.as_bytes(),
            },
        )
        .map_err(|_| GatewayError::Decrypt("message authentication failed".to_string()))?;

    String::from_utf8(plaintext).map_err(|e| GatewayError::Decrypt(e.to_string()))
}

/// 生成随机字符串 (大小写字母和数字)
pub fn generate_nonce_str(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// 生成HMAC-SHA256签名
///
/// # Arguments
/// * `message` - 要签名的消息
/// * `secret` - 签名密钥
///
/// # Returns
/// * 十六进制格式的签名字符串
pub fn generate_hmac_signature(message: &str, secret: &str) -> Result<String, GatewayError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::Sign(format!("invalid HMAC key: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// 常量时间字符串比较 (防止时序攻击)
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}
