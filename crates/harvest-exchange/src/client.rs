//! 서명된 REST 클라이언트.
//!
//! 모든 요청은 공유 `RateLimiter`를 통과한 뒤 `RequestSigner` 헤더를 붙여 전송됩니다.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::RequestSigner;
use crate::config::{KalshiConfig, API_PREFIX};
use crate::rate_limiter::RateLimiter;
use crate::traits::{CatalogApi, ExchangeResult};
use crate::types::{EventsResponse, Item, MarketsResponse, Page};
use crate::ExchangeError;

/// 이벤트 목록 페이지 크기 기본값.
pub const DEFAULT_PAGE_LIMIT: u32 = 100;

/// 에러 메시지에 포함할 응답 본문 최대 길이.
const MAX_ERROR_BODY: usize = 512;

/// 카탈로그 REST 클라이언트.
#[derive(Debug, Clone)]
pub struct KalshiClient {
    config: KalshiConfig,
    client: Client,
    signer: Arc<RequestSigner>,
    limiter: Arc<RateLimiter>,
    page_limit: u32,
}

impl KalshiClient {
    /// 설정으로부터 생성 (키 파일 로드 포함).
    ///
    /// # Errors
    /// 키 파일을 읽을 수 없으면 `ExchangeError::InvalidKey`,
    /// HTTP 클라이언트 생성에 실패하면 `ExchangeError::NetworkError`를 반환합니다.
    pub fn new(config: KalshiConfig) -> ExchangeResult<Self> {
        let signer = RequestSigner::from_pem_file(&config.key_id, &config.private_key_path)?;
        let limiter = RateLimiter::from_millis(config.rate_limit_ms);
        Self::with_parts(config, Arc::new(signer), Arc::new(limiter))
    }

    /// 서명기와 rate limiter를 직접 지정해 생성.
    pub fn with_parts(
        config: KalshiConfig,
        signer: Arc<RequestSigner>,
        limiter: Arc<RateLimiter>,
    ) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExchangeError::NetworkError(format!("HTTP client 생성 실패: {}", e)))?;

        Ok(Self {
            config,
            client,
            signer,
            limiter,
            page_limit: DEFAULT_PAGE_LIMIT,
        })
    }

    /// 이벤트 목록 페이지 크기 지정.
    pub fn with_page_limit(mut self, page_limit: u32) -> Self {
        self.page_limit = page_limit.max(1);
        self
    }

    /// 서명된 GET 요청.
    async fn signed_get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let path = format!("{}{}", API_PREFIX, endpoint);
        let url = format!("{}{}", self.config.rest_base_url(), path);

        self.limiter.throttle().await;

        let headers = self.signer.headers("GET", &path);
        debug!(path = %path, params = ?params, "GET (signed)");

        let mut request = self.client.get(&url).query(params);
        for (name, value) in headers.pairs() {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// API 응답 처리.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> ExchangeResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                ExchangeError::ParseError(format!("응답 파싱 실패: {} (status {})", e, status))
            });
        }

        let message: String = body.chars().take(MAX_ERROR_BODY).collect();
        warn!(status = status.as_u16(), body = %message, "API 에러 응답");

        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExchangeError::Unauthorized(message),
            StatusCode::TOO_MANY_REQUESTS => ExchangeError::RateLimited,
            _ => ExchangeError::ApiError {
                code: status.as_u16(),
                message,
            },
        })
    }
}

#[async_trait]
impl CatalogApi for KalshiClient {
    async fn list_events(
        &self,
        cursor: Option<String>,
        status: Option<&str>,
    ) -> ExchangeResult<Page> {
        let mut params = vec![("limit", self.page_limit.to_string())];
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            params.push(("cursor", cursor));
        }
        if let Some(status) = status.filter(|s| !s.is_empty()) {
            params.push(("status", status.to_string()));
        }

        let response: EventsResponse = self.signed_get("/events", &params).await?;
        Ok(response.into())
    }

    async fn list_markets(&self, event_ticker: &str) -> ExchangeResult<Vec<Item>> {
        let params = [("event_ticker", event_ticker.to_string())];
        let response: MarketsResponse = self.signed_get("/markets", &params).await?;
        Ok(response.markets)
    }
}
