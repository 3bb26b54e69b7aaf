//! Header sets for the two backend calls.
//!
//! The backend only hands out session tokens to requests that look like a
//! desktop Chrome, so both calls carry the same browser fingerprint.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::ProxyError;

/// Header the backend uses for the session token, on requests and responses.
pub const SESSION_HEADER: &str = "x-vqd-4";

const BACKEND_ORIGIN: &str = "https://duckduckgo.com";
const BACKEND_REFERER: &str = "https://duckduckgo.com/";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36";
const SEC_CH_UA: &str =
    "\"Not_A Brand\";v=\"99\", \"Google Chrome\";v=\"109\", \"Chromium\";v=\"109\"";

const BROWSER_FINGERPRINT: &[(&str, &str)] = &[
    ("accept-language", "en-US,en;q=0.9"),
    ("sec-ch-ua", SEC_CH_UA),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", "\"Windows\""),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-origin"),
    ("user-agent", USER_AGENT),
];

fn insert_static(headers: &mut HeaderMap, pairs: &[(&'static str, &'static str)]) {
    for (name, value) in pairs {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
}

/// Headers for the handshake `GET` against the status endpoint.
pub fn status_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_static(&mut headers, &[("accept", "*/*")]);
    insert_static(&mut headers, BROWSER_FINGERPRINT);
    insert_static(&mut headers, &[("x-vqd-accept", "1")]);
    headers
}

/// Headers for the streaming `POST`, carrying `token` in [`SESSION_HEADER`].
pub fn chat_headers(token: &str) -> Result<HeaderMap, ProxyError> {
    let mut headers = HeaderMap::new();
    insert_static(
        &mut headers,
        &[
            ("accept", "text/event-stream"),
            ("content-type", "application/json"),
            ("origin", BACKEND_ORIGIN),
            ("referer", BACKEND_REFERER),
        ],
    );
    insert_static(&mut headers, BROWSER_FINGERPRINT);

    let value = HeaderValue::from_str(token).map_err(|_| ProxyError::InvalidHeader {
        name: SESSION_HEADER,
    })?;
    headers.insert(HeaderName::from_static(SESSION_HEADER), value);
    Ok(headers)
}
