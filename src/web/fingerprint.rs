//! 客户端指纹
//!
//! 限速按指纹而非原始 IP 记账：IP 与 User-Agent 拼接后哈希，日志中
//! 永不出现可直接定位用户的原始值。

use std::fmt::Write;

use sha2::{Digest, Sha256};

/// 由 IP 与 User-Agent 计算指纹
///
/// SHA-256 十六进制摘要的前 16 个字符；同一客户端的指纹在会话间
/// 稳定，不同 IP 或 UA 产生不同指纹。
pub fn hash_fingerprint(ip: &str, user_agent: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", ip, user_agent).as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex.truncate(16);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = hash_fingerprint("1.2.3.4", "Mozilla/5.0");
        let b = hash_fingerprint("1.2.3.4", "Mozilla/5.0");
        assert_eq!(a, b, "same inputs must yield the same fingerprint");
        assert_eq!(a.len(), 16, "fingerprint should be 16 hex characters");
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_varies_with_inputs() {
        let base = hash_fingerprint("1.2.3.4", "Mozilla/5.0");
        assert_ne!(base, hash_fingerprint("1.2.3.5", "Mozilla/5.0"));
        assert_ne!(base, hash_fingerprint("1.2.3.4", "curl/8.0"));
    }
}
