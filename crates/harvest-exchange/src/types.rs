//! 카탈로그 도메인 타입.
//!
//! 원격 항목(이벤트, 마켓)은 자유 형식 JSON 객체이며 엔진에 의미 있는 것은 키뿐입니다.

use std::borrow::Borrow;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 원격 항목 (이벤트 또는 마켓).
///
/// 로컬에서 수정하지 않고 받은 그대로 보관합니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item(pub Map<String, Value>);

impl Item {
    /// 문자열 필드 조회 (빈 문자열은 없는 것으로 취급).
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// 이벤트 티커 필드.
    pub fn event_ticker(&self) -> Option<&str> {
        self.str_field("event_ticker")
    }

    /// 표시용 제목.
    pub fn title(&self) -> &str {
        self.str_field("title").unwrap_or("N/A")
    }

    /// 표시용 카테고리.
    pub fn category(&self) -> &str {
        self.str_field("category").unwrap_or("N/A")
    }

    /// 거래 중인 마켓인지 (`status == "active"`).
    pub fn is_active(&self) -> bool {
        self.str_field("status") == Some(ACTIVE_STATUS)
    }
}

/// 거래 중인 마켓의 상태 값
pub const ACTIVE_STATUS: &str = "active";

/// 거래 중인 마켓만 순서대로 골라냄.
pub fn open_markets(markets: &[Item]) -> Vec<Item> {
    markets.iter().filter(|m| m.is_active()).cloned().collect()
}

impl From<Value> for Item {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Item(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Item(map)
            }
        }
    }
}

/// 항목의 고유 키 (이벤트 티커).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// 항목에서 키를 도출.
///
/// 우선순위:
/// 1. 비어 있지 않은 `event_ticker` 필드
/// 2. 비어 있지 않은 `category`가 있을 때 (대문자화 후 영숫자만 남김, 유니코드 문자 포함)
///    - `strike_date` 있음: `KX{CAT}-{YYYYMMDD}` (앞 10자에서 `-` 제거)
///    - `strike_period` 있음: `KX{CAT}P-{reference_date}`
/// 3. 그 외: `None`
///
/// 영숫자가 하나도 남지 않는 카테고리(`"--"`)는 빈 `CAT`으로 키를 만듭니다 (`KX-20240101`).
///
/// 순수 함수입니다. 기간형 이벤트의 날짜는 호출자가 넘긴 `reference_date`를 씁니다.
pub fn derive_key(item: &Item, reference_date: NaiveDate) -> Option<Key> {
    if let Some(ticker) = item.event_ticker() {
        return Some(Key::new(ticker));
    }

    let category: String = item
        .str_field("category")?
        .chars()
        .flat_map(char::to_uppercase)
        .filter(|c| c.is_alphanumeric())
        .collect();

    if let Some(strike_date) = item.str_field("strike_date") {
        let date: String = strike_date.chars().take(10).filter(|c| *c != '-').collect();
        return Some(Key::new(format!("KX{}-{}", category, date)));
    }

    if item.str_field("strike_period").is_some() {
        return Some(Key::new(format!(
            "KX{}P-{}",
            category,
            reference_date.format("%Y%m%d")
        )));
    }

    None
}

/// 목록 엔드포인트의 한 페이지.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Item>,
    /// 다음 페이지 커서 (`None` 또는 빈 문자열이면 끝)
    pub cursor: Option<String>,
}

/// `GET /events` 응답.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<Item>,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl From<EventsResponse> for Page {
    fn from(resp: EventsResponse) -> Self {
        Page {
            items: resp.events,
            cursor: resp.cursor,
        }
    }
}

/// `GET /markets` 응답.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketsResponse {
    pub markets: Vec<Item>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        Item::from(value)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 5).unwrap()
    }

    #[test]
    fn test_derive_key_prefers_event_ticker() {
        let it = item(json!({
            "event_ticker": "PRES-2024",
            "category": "Politics",
            "strike_date": "2024-11-05T00:00:00Z"
        }));
        assert_eq!(derive_key(&it, today()), Some(Key::from("PRES-2024")));
    }

    #[test]
    fn test_derive_key_from_strike_date() {
        let it = item(json!({
            "event_ticker": "",
            "category": "Climate & Weather",
            "strike_date": "2025-01-31T15:00:00Z"
        }));
        assert_eq!(
            derive_key(&it, today()),
            Some(Key::from("KXCLIMATEWEATHER-20250131"))
        );
    }

    #[test]
    fn test_derive_key_from_strike_period() {
        let it = item(json!({ "category": "econ", "strike_period": "week" }));
        assert_eq!(derive_key(&it, today()), Some(Key::from("KXECONP-20241105")));
    }

    #[test]
    fn test_derive_key_none_without_usable_fields() {
        assert_eq!(derive_key(&item(json!({ "title": "x" })), today()), None);
        assert_eq!(
            derive_key(&item(json!({ "category": "econ" })), today()),
            None
        );
    }

    #[test]
    fn test_derive_key_category_checked_before_stripping() {
        assert_eq!(
            derive_key(&item(json!({ "category": "--", "strike_date": "2024-01-01" })), today()),
            Some(Key::from("KX-20240101"))
        );
        assert_eq!(
            derive_key(&item(json!({ "category": "", "strike_date": "2024-01-01" })), today()),
            None
        );
    }

    #[test]
    fn test_derive_key_keeps_unicode_letters() {
        let it = item(json!({ "category": "Économie & Société", "strike_period": "month" }));
        assert_eq!(
            derive_key(&it, today()),
            Some(Key::from("KXÉCONOMIESOCIÉTÉP-20241105"))
        );
    }

    #[test]
    fn test_open_markets_keeps_only_active() {
        let markets = vec![
            item(json!({ "ticker": "A", "status": "active" })),
            item(json!({ "ticker": "B", "status": "closed" })),
            item(json!({ "ticker": "C" })),
            item(json!({ "ticker": "D", "status": "active" })),
        ];
        let open = open_markets(&markets);
        let tickers: Vec<&str> = open.iter().filter_map(|m| m.str_field("ticker")).collect();
        assert_eq!(tickers, vec!["A", "D"]);
        assert!(open_markets(&[]).is_empty());
    }

    #[test]
    fn test_events_response_without_cursor() {
        let resp: EventsResponse =
            serde_json::from_value(json!({ "events": [{ "event_ticker": "A" }] })).unwrap();
        let page = Page::from(resp);
        assert_eq!(page.items.len(), 1);
        assert!(page.cursor.is_none());
    }
}
