//! 거래소 연결 설정.

use std::fmt;
use std::path::PathBuf;

use crate::ExchangeError;

/// API 버전 경로 접두사.
pub const API_PREFIX: &str = "/trade-api/v2";

/// 접속 환경.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// 운영 환경
    Prod,
    /// 데모 환경
    Demo,
}

impl Environment {
    /// REST API 기본 URL 반환.
    pub fn rest_base_url(&self) -> &'static str {
        match self {
            Environment::Prod => "https://api.elections.kalshi.com",
            Environment::Demo => "https://demo-api.kalshi.co",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Ok(Environment::Prod),
            "demo" => Ok(Environment::Demo),
            other => Err(ExchangeError::Config(format!("알 수 없는 환경: {}", other))),
        }
    }
}

/// 거래소 클라이언트 설정.
///
/// # 보안
/// - `Debug` 구현은 키 식별자를 마스킹합니다.
#[derive(Clone)]
pub struct KalshiConfig {
    /// API 키 식별자
    pub key_id: String,
    /// RSA 개인키 PEM 파일 경로
    pub private_key_path: PathBuf,
    /// 접속 환경
    pub environment: Environment,
    /// 기본 URL 재정의 (테스트, 프록시)
    pub base_url: Option<String>,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 요청 간 최소 간격 (밀리초)
    pub rate_limit_ms: u64,
}

/// 로그용 키 ID 마스킹 (앞뒤 4글자만 노출, 짧으면 전부 가림).
pub(crate) fn mask_key_id(key_id: &str) -> String {
    let len = key_id.chars().count();
    if len <= 8 {
        return "***REDACTED***".to_string();
    }
    let head: String = key_id.chars().take(4).collect();
    let tail: String = key_id.chars().skip(len - 4).collect();
    format!("{}...{}", head, tail)
}

impl fmt::Debug for KalshiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked_key = mask_key_id(&self.key_id);

        f.debug_struct("KalshiConfig")
            .field("key_id", &masked_key)
            .field("private_key_path", &self.private_key_path)
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("rate_limit_ms", &self.rate_limit_ms)
            .finish()
    }
}

impl KalshiConfig {
    /// 새 설정 생성 (운영 환경, 기본값).
    pub fn new(key_id: impl Into<String>, private_key_path: impl Into<PathBuf>) -> Self {
        Self {
            key_id: key_id.into(),
            private_key_path: private_key_path.into(),
            environment: Environment::Prod,
            base_url: None,
            timeout_secs: 30,
            rate_limit_ms: 100,
        }
    }

    /// 환경 지정.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// 기본 URL 재정의.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// 환경 변수에서 생성.
    ///
    /// - `KALSHI_KEY_ID`, `KALSHI_PRIVATE_KEY_PATH` (필수)
    /// - `KALSHI_ENV` (`prod` | `demo`, 기본 `prod`)
    /// - `KALSHI_BASE_URL`, `KALSHI_TIMEOUT_SECS`, `KALSHI_RATE_LIMIT_MS`
    pub fn from_env() -> Result<Self, ExchangeError> {
        let key_id = std::env::var("KALSHI_KEY_ID").map_err(|_| {
            ExchangeError::Config("KALSHI_KEY_ID 환경변수가 설정되지 않았습니다".to_string())
        })?;
        let private_key_path = std::env::var("KALSHI_PRIVATE_KEY_PATH").map_err(|_| {
            ExchangeError::Config(
                "KALSHI_PRIVATE_KEY_PATH 환경변수가 설정되지 않았습니다".to_string(),
            )
        })?;

        let environment = match std::env::var("KALSHI_ENV") {
            Ok(value) => value.parse()?,
            Err(_) => Environment::Prod,
        };

        let mut config = Self::new(key_id, private_key_path).with_environment(environment);
        if let Some(base_url) = std::env::var("KALSHI_BASE_URL").ok().filter(|s| !s.is_empty()) {
            config = config.with_base_url(base_url);
        }
        if let Some(timeout_secs) = std::env::var("KALSHI_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.timeout_secs = timeout_secs;
        }
        if let Some(rate_limit_ms) = std::env::var("KALSHI_RATE_LIMIT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.rate_limit_ms = rate_limit_ms;
        }
        Ok(config)
    }

    /// REST API 기본 URL 반환.
    pub fn rest_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.rest_base_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parse() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Prod);
        assert_eq!("DEMO".parse::<Environment>().unwrap(), Environment::Demo);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_base_url_override() {
        let config = KalshiConfig::new("k", "key.pem").with_environment(Environment::Demo);
        assert_eq!(config.rest_base_url(), "https://demo-api.kalshi.co");

        let config = config.with_base_url("http://127.0.0.1:1234");
        assert_eq!(config.rest_base_url(), "http://127.0.0.1:1234");
    }

    #[test]
    fn test_debug_masks_key_id() {
        let config = KalshiConfig::new("05b95ed4-a236-41a1-9e3b-81124f6871dd", "key.pem");
        let dbg = format!("{:?}", config);
        assert!(dbg.contains("05b9...71dd"));
        assert!(!dbg.contains("a236"));
    }

    #[test]
    fn test_mask_key_id_counts_chars_not_bytes() {
        // 4바이트 경계가 문자 중간에 걸리는 키
        assert_eq!(mask_key_id("éééééééééé"), "éééé...éééé");
        assert_eq!(mask_key_id("a€bc-0000-d€ef"), "a€bc...d€ef");
        assert_eq!(mask_key_id("ééééé"), "***REDACTED***");

        let config = KalshiConfig::new("가나다라마바사아자차", "key.pem");
        let dbg = format!("{:?}", config);
        assert!(dbg.contains("가나다라...사아자차"));
        assert!(!dbg.contains("마바"));
    }
}
