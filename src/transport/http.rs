//! Google Sheets v4 REST transport
//!
//! Issues `values:batchGet` requests. Credentials are supplied from outside
//! (an access token or API key in the environment); minting them is somebody
//! else's job.

use super::{SheetTransport, TransportError};
use crate::config::TransportSettings;
use crate::sheet::RawBlock;
use crate::Result;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Environment variable holding an OAuth access token
pub const ACCESS_TOKEN_ENV: &str = "SHEETCACHE_ACCESS_TOKEN";

/// Environment variable holding an API key (public sheets only)
pub const API_KEY_ENV: &str = "SHEETCACHE_API_KEY";

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

/// How requests authenticate
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    ApiKey(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Bearer(_) => f.write_str("Bearer(***)"),
            Credentials::ApiKey(_) => f.write_str("ApiKey(***)"),
        }
    }
}

impl Credentials {
    /// Read credentials from the environment; the access token wins when both are set
    pub fn from_env() -> Option<Self> {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        non_empty(ACCESS_TOKEN_ENV)
            .map(Credentials::Bearer)
            .or_else(|| non_empty(API_KEY_ENV).map(Credentials::ApiKey))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    #[serde(default)]
    value_ranges: Vec<ValueRange>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    /// Absent when the range holds no data
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Sheets API client
pub struct GoogleSheetsTransport {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl GoogleSheetsTransport {
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        credentials: Option<Credentials>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::USER_AGENT,
                    header::HeaderValue::from_static(concat!("sheetcache/", env!("CARGO_PKG_VERSION"))),
                );
                headers.insert(
                    header::ACCEPT,
                    header::HeaderValue::from_static("application/json"),
                );
                headers
            })
            .build()?;

        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Build from configuration, reading credentials from the environment
    pub fn from_settings(settings: &TransportSettings) -> Result<Self> {
        Self::new(
            settings.base_url.clone(),
            Duration::from_secs(settings.timeout_secs),
            Credentials::from_env(),
        )
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    fn batch_get_url(&self, spreadsheet_id: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values:batchGet",
            self.base_url,
            urlencoding::encode(spreadsheet_id)
        )
    }
}

/// Prefix a range with its worksheet: `'Name'!A1`, single quotes doubled.
///
/// Ranges that already name a worksheet are left alone.
pub fn qualify_range(worksheet: Option<&str>, range: &str) -> String {
    match worksheet {
        Some(name) if !range.contains('!') => {
            format!("'{}'!{}", name.replace('\'', "''"), range)
        }
        _ => range.to_string(),
    }
}

/// Map a non-success HTTP status and body to a transport error
pub fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> TransportError {
    let quota_body = body.contains("RATE_LIMIT_EXCEEDED")
        || body.contains("RESOURCE_EXHAUSTED")
        || body.to_ascii_lowercase().contains("quota");

    match status {
        StatusCode::TOO_MANY_REQUESTS => TransportError::RateLimited { retry_after },
        StatusCode::FORBIDDEN if quota_body => TransportError::RateLimited { retry_after },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            TransportError::Auth(format!("HTTP {}: {}", status, truncate(body)))
        }
        status => TransportError::Transport(format!("HTTP {}: {}", status, truncate(body))),
    }
}

fn truncate(body: &str) -> &str {
    const LIMIT: usize = 200;
    match body.char_indices().nth(LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn into_blocks(response: BatchGetResponse) -> Vec<RawBlock> {
    response
        .value_ranges
        .into_iter()
        .map(|range| {
            range
                .values
                .iter()
                .map(|row| row.iter().map(cell_to_string).collect())
                .collect()
        })
        .collect()
}

#[async_trait]
impl SheetTransport for GoogleSheetsTransport {
    async fn batch_read(
        &self,
        spreadsheet_id: &str,
        worksheet: Option<&str>,
        ranges: &[String],
    ) -> std::result::Result<Vec<RawBlock>, TransportError> {
        let mut query: Vec<(&str, String)> = ranges
            .iter()
            .map(|r| ("ranges", qualify_range(worksheet, r)))
            .collect();
        query.push(("majorDimension", "ROWS".to_string()));
        query.push(("valueRenderOption", "FORMATTED_VALUE".to_string()));

        let mut request = self.client.get(self.batch_get_url(spreadsheet_id));
        match &self.credentials {
            Some(Credentials::Bearer(token)) => request = request.bearer_auth(token),
            Some(Credentials::ApiKey(key)) => query.push(("key", key.clone())),
            None => {}
        }

        debug!(spreadsheet = spreadsheet_id, ranges = ranges.len(), "Sheets batchGet");

        let response = request
            .query(&query)
            .send()
            .await
            .map_err(|e| TransportError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &body));
        }

        let parsed: BatchGetResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Transport(format!("Malformed response: {}", e)))?;

        let blocks = into_blocks(parsed);
        if blocks.len() != ranges.len() {
            return Err(TransportError::Transport(format!(
                "Malformed response: requested {} ranges, got {}",
                ranges.len(),
                blocks.len()
            )));
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify_range() {
        assert_eq!(qualify_range(None, "V2"), "V2");
        assert_eq!(qualify_range(Some("MY"), "V2"), "'MY'!V2");
        assert_eq!(qualify_range(Some("Bob's Tab"), "A:Z"), "'Bob''s Tab'!A:Z");
        assert_eq!(qualify_range(Some("MY"), "'Other'!A1"), "'Other'!A1");
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(9)), ""),
            TransportError::RateLimited {
                retry_after: Some(Duration::from_secs(9))
            }
        );
        assert_eq!(
            classify_status(
                StatusCode::FORBIDDEN,
                None,
                r#"{"error":{"status":"PERMISSION_DENIED","details":[{"reason":"RATE_LIMIT_EXCEEDED"}]}}"#
            ),
            TransportError::rate_limited()
        );
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, None, "caller does not have permission"),
            TransportError::Auth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, None, ""),
            TransportError::Auth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, None, "boom"),
            TransportError::Transport(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, None, ""),
            TransportError::Transport(_)
        ));
    }

    #[test]
    fn test_parse_response_blocks() {
        let body = r#"{
            "spreadsheetId": "abc",
            "valueRanges": [
                {"range": "'MY'!V2", "majorDimension": "ROWS", "values": [["1,234"]]},
                {"range": "'MY'!V28", "majorDimension": "ROWS"},
                {"range": "'MY'!A:B", "majorDimension": "ROWS", "values": [["Week", 3], [true, null]]}
            ]
        }"#;
        let parsed: BatchGetResponse = serde_json::from_str(body).unwrap();
        let blocks = into_blocks(parsed);

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], vec![vec!["1,234".to_string()]]);
        assert!(blocks[1].is_empty());
        assert_eq!(
            blocks[2],
            vec![
                vec!["Week".to_string(), "3".to_string()],
                vec!["true".to_string(), String::new()],
            ]
        );
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = header::HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(header::RETRY_AFTER, header::HeaderValue::from_static("12"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_transport_creation() {
        let transport = GoogleSheetsTransport::new(
            "https://sheets.example.com/",
            Duration::from_secs(30),
            Some(Credentials::ApiKey("k".into())),
        )
        .expect("Failed to create transport");
        assert!(transport.is_authenticated());
        assert_eq!(
            transport.batch_get_url("id/1"),
            "https://sheets.example.com/v4/spreadsheets/id%2F1/values:batchGet"
        );
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(500);
        assert_eq!(truncate(&body).len(), 200);
        assert_eq!(truncate("short"), "short");
    }
}
