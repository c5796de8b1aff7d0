use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use hrbridge_core::UpstreamError;

use crate::rpc::RawResponse;

/// HTTP seam for upstream calls. Implementations only ever fail with
/// `TransportError`; status and body classification happens above this
/// layer.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        session_cookie: Option<&str>,
        timeout: Duration,
    ) -> Result<RawResponse, UpstreamError>;
}

/// reqwest-backed transport with one pooled client shared by every call.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| UpstreamError::transport(format!("http client setup failed: {err}")))?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_owned() })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        session_cookie: Option<&str>,
        timeout: Duration,
    ) -> Result<RawResponse, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body).timeout(timeout);
        if let Some(cookie) = session_cookie {
            request = request.header(reqwest::header::COOKIE, format!("session_id={cookie}"));
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                UpstreamError::transport(format!("upstream call timed out: {err}"))
            } else {
                UpstreamError::transport(format!("upstream unreachable: {err}"))
            }
        })?;

        let status = response.status().as_u16();
        let session_cookie = extract_session_cookie(response.headers());
        let body: Value = response
            .json()
            .await
            .map_err(|err| UpstreamError::transport(format!("malformed upstream reply: {err}")))?;

        Ok(RawResponse { status, body, session_cookie })
    }
}

fn extract_session_cookie(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie| {
            let (name, rest) = cookie.split_once('=')?;
            if name.trim() != "session_id" {
                return None;
            }
            let value = rest.split(';').next()?.trim();
            (!value.is_empty()).then(|| value.to_owned())
        })
}

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};

    use super::extract_session_cookie;

    #[test]
    fn session_cookie_is_extracted_from_set_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("frontend_lang=en_US; Path=/"));
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("session_id=abc123def; Expires=Wed, 01 Jan 2026 00:00:00 GMT; Path=/"),
        );

        assert_eq!(extract_session_cookie(&headers), Some("abc123def".to_owned()));
    }

    #[test]
    fn missing_session_cookie_yields_none() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("frontend_lang=en_US; Path=/"));
        assert_eq!(extract_session_cookie(&headers), None);
    }
}
