//! 요청 서명 모듈.
//!
//! 모든 REST 호출에는 RSA-PSS(SHA-256) 서명 헤더가 필요합니다.
//!
//! # 서명 메시지
//!
//! ```text
//! {timestamp_ms}{METHOD}{path}
//! ```
//!
//! - `timestamp_ms`: 밀리초 단위 epoch (10진수 문자열)
//! - `METHOD`: 대문자 HTTP 메서드
//! - `path`: 쿼리 문자열을 제외한 요청 경로 (예: `/trade-api/v2/events`)
//!
//! PSS 솔트 때문에 같은 입력이라도 서명 값은 매번 달라집니다.
//! 서명 검증은 공개키로만 해야 합니다.

use std::fmt;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{Keypair, RandomizedSigner, SignatureEncoding, Verifier};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use tracing::debug;

use crate::config::mask_key_id;
use crate::ExchangeError;

/// 키 식별자 헤더.
pub const ACCESS_KEY_HEADER: &str = "KALSHI-ACCESS-KEY";
/// 서명 헤더.
pub const ACCESS_SIGNATURE_HEADER: &str = "KALSHI-ACCESS-SIGNATURE";
/// 타임스탬프 헤더.
pub const ACCESS_TIMESTAMP_HEADER: &str = "KALSHI-ACCESS-TIMESTAMP";

/// 요청마다 붙는 인증 헤더 묶음.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub content_type: &'static str,
    pub key_id: String,
    pub signature: String,
    pub timestamp: String,
}

impl AuthHeaders {
    /// (헤더 이름, 값) 쌍으로 변환.
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("Content-Type", self.content_type),
            (ACCESS_KEY_HEADER, &self.key_id),
            (ACCESS_SIGNATURE_HEADER, &self.signature),
            (ACCESS_TIMESTAMP_HEADER, &self.timestamp),
        ]
    }
}

/// RSA-PSS 요청 서명기.
///
/// 키가 잘못된 경우는 생성 시점에만 실패하며, 서명 자체는 실패하지 않습니다.
#[derive(Clone)]
pub struct RequestSigner {
    key_id: String,
    signing_key: BlindedSigningKey<Sha256>,
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked_key = mask_key_id(&self.key_id);

        f.debug_struct("RequestSigner")
            .field("key_id", &masked_key)
            .field("signing_key", &"***REDACTED***")
            .finish()
    }
}

impl RequestSigner {
    /// 이미 로드된 개인키로 생성.
    pub fn new(key_id: impl Into<String>, private_key: RsaPrivateKey) -> Self {
        Self {
            key_id: key_id.into(),
            // 솔트 길이 = 다이제스트 길이 (32바이트)
            signing_key: BlindedSigningKey::<Sha256>::new(private_key),
        }
    }

    /// PEM 문자열(PKCS#8 또는 PKCS#1)에서 생성.
    ///
    /// # Errors
    /// PEM을 해석할 수 없으면 `ExchangeError::InvalidKey`를 반환합니다.
    pub fn from_pem(key_id: impl Into<String>, pem: &str) -> Result<Self, ExchangeError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| ExchangeError::InvalidKey(format!("PEM 파싱 실패: {}", e)))?;

        Ok(Self::new(key_id, private_key))
    }

    /// PEM 파일에서 생성.
    pub fn from_pem_file(
        key_id: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Self, ExchangeError> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path).map_err(|e| {
            ExchangeError::InvalidKey(format!("키 파일 읽기 실패 ({}): {}", path.display(), e))
        })?;

        debug!(path = %path.display(), "서명 키 로드");
        Self::from_pem(key_id, &pem)
    }

    /// 키 식별자 반환.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// 현재 타임스탬프(밀리초) 반환.
    pub fn timestamp_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// 서명 대상 메시지 생성.
    pub fn message(method: &str, path: &str, timestamp_ms: i64) -> String {
        let path = path.split('?').next().unwrap_or(path);
        format!("{}{}{}", timestamp_ms, method.to_uppercase(), path)
    }

    /// 요청 서명 (base64).
    pub fn sign(&self, method: &str, path: &str, timestamp_ms: i64) -> String {
        let message = Self::message(method, path, timestamp_ms);
        let signature = self
            .signing_key
            .sign_with_rng(&mut rand::thread_rng(), message.as_bytes());
        BASE64.encode(signature.to_bytes())
    }

    /// 현재 시각 기준 인증 헤더 생성.
    pub fn headers(&self, method: &str, path: &str) -> AuthHeaders {
        self.headers_at(method, path, Self::timestamp_ms())
    }

    /// 지정한 시각 기준 인증 헤더 생성.
    pub fn headers_at(&self, method: &str, path: &str, timestamp_ms: i64) -> AuthHeaders {
        AuthHeaders {
            content_type: "application/json",
            key_id: self.key_id.clone(),
            signature: self.sign(method, path, timestamp_ms),
            timestamp: timestamp_ms.to_string(),
        }
    }

    /// 서명 검증용 공개키 반환.
    pub fn verifying_key(&self) -> VerifyingKey<Sha256> {
        self.signing_key.verifying_key()
    }

    /// 서명 검증.
    ///
    /// 키 설정 점검(네트워크 없이)과 테스트에서 사용합니다.
    pub fn verify(&self, method: &str, path: &str, timestamp_ms: i64, signature: &str) -> bool {
        let Ok(bytes) = BASE64.decode(signature) else {
            return false;
        };
        let Ok(signature) = Signature::try_from(bytes.as_slice()) else {
            return false;
        };
        let message = Self::message(method, path, timestamp_ms);
        self.verifying_key()
            .verify(message.as_bytes(), &signature)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use std::sync::OnceLock;

    fn test_key() -> RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| {
            RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("key generation")
        })
        .clone()
    }

    #[test]
    fn test_message_format() {
        let msg = RequestSigner::message("get", "/trade-api/v2/events?limit=100", 1700000000123);
        assert_eq!(msg, "1700000000123GET/trade-api/v2/events");
    }

    #[test]
    fn test_signature_verifies_against_public_key() {
        let signer = RequestSigner::new("key-id-1234567890", test_key());
        let sig = signer.sign("GET", "/trade-api/v2/markets", 1700000000000);

        assert!(signer.verify("GET", "/trade-api/v2/markets", 1700000000000, &sig));
        // 다른 타임스탬프로는 검증 실패
        assert!(!signer.verify("GET", "/trade-api/v2/markets", 1700000000001, &sig));
        // 쿼리 문자열은 서명 대상이 아님
        assert!(signer.verify("get", "/trade-api/v2/markets?event_ticker=X", 1700000000000, &sig));
    }

    #[test]
    fn test_signatures_are_salted() {
        let signer = RequestSigner::new("key-id", test_key());
        let a = signer.sign("GET", "/p", 1);
        let b = signer.sign("GET", "/p", 1);
        assert_ne!(a, b);
        assert!(signer.verify("GET", "/p", 1, &a));
        assert!(signer.verify("GET", "/p", 1, &b));
    }

    #[test]
    fn test_headers_contain_all_fields() {
        let signer = RequestSigner::new("my-key", test_key());
        let headers = signer.headers_at("GET", "/trade-api/v2/events", 42);

        assert_eq!(headers.content_type, "application/json");
        assert_eq!(headers.key_id, "my-key");
        assert_eq!(headers.timestamp, "42");
        assert!(signer.verify("GET", "/trade-api/v2/events", 42, &headers.signature));

        let names: Vec<&str> = headers.pairs().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            names,
            vec![
                "Content-Type",
                ACCESS_KEY_HEADER,
                ACCESS_SIGNATURE_HEADER,
                ACCESS_TIMESTAMP_HEADER
            ]
        );
    }

    #[test]
    fn test_from_pem_roundtrip() {
        let pem = test_key().to_pkcs8_pem(LineEnding::LF).expect("encode pem");
        let signer = RequestSigner::from_pem("k", &pem).expect("valid pem");
        let sig = signer.sign("GET", "/x", 7);
        assert!(signer.verify("GET", "/x", 7, &sig));
    }

    #[test]
    fn test_invalid_pem_is_rejected() {
        let err = RequestSigner::from_pem("k", "not a key").unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidKey(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_key_file_is_rejected() {
        let err = RequestSigner::from_pem_file("k", "/nonexistent/key.pem").unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidKey(_)));
    }

    #[test]
    fn test_debug_masks_key() {
        let signer = RequestSigner::new("abcd-1234-efgh-5678", test_key());
        let dbg = format!("{:?}", signer);
        assert!(dbg.contains("abcd...5678"));
        assert!(!dbg.contains("1234-efgh"));
    }

    #[test]
    fn test_debug_masks_multibyte_key_id() {
        let signer = RequestSigner::new("키아이디-테스트-서명키값", test_key());
        let dbg = format!("{:?}", signer);
        assert!(dbg.contains("키아이디...서명키값"));
        assert!(!dbg.contains("테스트"));
    }
}
