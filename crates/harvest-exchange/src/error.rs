//! 거래소 에러 타입.

use thiserror::Error;

/// 거래소 관련 에러.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 인증/권한 에러
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 요청 한도 초과
    #[error("Rate limit exceeded")]
    RateLimited,

    /// API 에러 코드
    #[error("API error {code}: {message}")]
    ApiError { code: u16, message: String },

    /// 파싱/역직렬화 에러 (예상과 다른 응답 형태 포함)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 서명 키를 읽을 수 없거나 유효하지 않음
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),

    /// 알 수 없는 에러
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ExchangeError {
    /// 재시도 가능한 에러인지 확인.
    ///
    /// 프로토콜 에러(`ParseError`, `ApiError`)도 재시도 대상으로 취급합니다.
    pub fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }

    /// 인증 에러인지 확인.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ExchangeError::Unauthorized(_))
    }

    /// 재시도하면 안 되는 치명적 에러인지 확인.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExchangeError::Unauthorized(_) | ExchangeError::InvalidKey(_) | ExchangeError::Config(_)
        )
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            ExchangeError::NetworkError(err.to_string())
        } else if err.is_decode() {
            ExchangeError::ParseError(err.to_string())
        } else {
            ExchangeError::Unknown(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_errors_are_retryable() {
        assert!(ExchangeError::ParseError("missing field".into()).is_retryable());
        assert!(ExchangeError::ApiError {
            code: 500,
            message: "boom".into()
        }
        .is_retryable());
        assert!(ExchangeError::RateLimited.is_retryable());
    }

    #[test]
    fn test_credential_errors_are_fatal() {
        assert!(ExchangeError::Unauthorized("bad key".into()).is_fatal());
        assert!(ExchangeError::InvalidKey("not pem".into()).is_fatal());
        assert!(!ExchangeError::Unauthorized("bad key".into()).is_retryable());
        assert!(ExchangeError::Unauthorized("x".into()).is_auth_error());
    }
}
