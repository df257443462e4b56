//! HRV measurement cloud service
//!
//! Configuration, credentials, token extraction and pagination for the
//! measurement service. The blocking HTTP client itself lives in
//! [`client`] and is only compiled with the `cloud` feature.

#[cfg(feature = "cloud")]
mod client;

#[cfg(feature = "cloud")]
pub use client::CloudClient;

use crate::error::IngestError;
use crate::logging::{LogEvent, LogSink};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use url::form_urlencoded;

/// Default page size for paginated listings
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Service endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// API root, with trailing slash
    pub base_url: String,
    pub login_url: String,
    pub redirect_uri: String,
    pub user_agent: String,
    pub page_size: usize,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl CloudConfig {
    pub fn production() -> Self {
        Self {
            base_url: "https://analysis.kubioscloud.com/".to_string(),
            login_url: "https://kubioscloud.auth.eu-west-1.amazoncognito.com/login".to_string(),
            redirect_uri: "https://analysis.kubioscloud.com/v1/portal/login".to_string(),
            user_agent: format!("synheart-ingest/{}", crate::INGEST_VERSION),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn staging() -> Self {
        Self {
            base_url: "https://analysis.stg.kubioscloud.com/".to_string(),
            login_url: "https://kubioscloud-stg.auth.eu-west-1.amazoncognito.com/login".to_string(),
            redirect_uri: "https://analysis.stg.kubioscloud.com/v1/portal/login".to_string(),
            ..Self::production()
        }
    }

    /// Join a resource path onto the API root
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Login credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub client_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl Credentials {
    /// Load credentials from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, IngestError> {
        let json = std::fs::read_to_string(path)?;
        let creds: Credentials = serde_json::from_str(&json)?;
        if creds.username.is_empty() || creds.password.is_empty() || creds.client_id.is_empty() {
            return Err(IngestError::ConfigError(
                "credentials need username, password and client_id".to_string(),
            ));
        }
        Ok(creds)
    }
}

/// Tokens issued by the login endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    pub id_token: String,
    pub access_token: String,
}

/// Extract tokens from the login redirect.
///
/// The implicit grant returns tokens in the fragment of the `Location` header.
/// Being redirected back to the login page means the credentials were rejected.
pub fn parse_login_redirect(location: &str, login_url: &str) -> Result<Tokens, IngestError> {
    if location == login_url {
        return Err(IngestError::AuthenticationError(
            "redirected back to login page".to_string(),
        ));
    }

    let fragment = location
        .split_once('#')
        .map(|(_, fragment)| fragment)
        .ok_or_else(|| IngestError::AuthenticationError("redirect has no token fragment".to_string()))?;

    let mut id_token = None;
    let mut access_token = None;
    for (key, value) in form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "id_token" if id_token.is_none() => id_token = Some(value.into_owned()),
            "access_token" if access_token.is_none() => access_token = Some(value.into_owned()),
            _ => {}
        }
    }

    match (id_token, access_token) {
        (Some(id_token), Some(access_token)) => Ok(Tokens {
            id_token,
            access_token,
        }),
        _ => Err(IngestError::AuthenticationError(
            "redirect is missing id_token or access_token".to_string(),
        )),
    }
}

/// Filters for measurement listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeasurementQuery {
    /// Measurement state (e.g. "finalized")
    pub state: Option<String>,
    /// Only measurements after this ISO-8601 timestamp
    pub from: Option<String>,
    /// Include measurement details
    pub details: bool,
}

impl MeasurementQuery {
    /// Query parameters for one page
    pub fn params(&self, offset: usize, count: usize) -> Vec<(String, String)> {
        let mut params = vec![
            ("count".to_string(), count.to_string()),
            ("offset".to_string(), offset.to_string()),
        ];
        if let Some(state) = &self.state {
            params.push(("state".to_string(), state.clone()));
        }
        if let Some(from) = &self.from {
            params.push(("from".to_string(), from.clone()));
        }
        if self.details {
            params.push(("details".to_string(), "yes".to_string()));
        }
        params
    }
}

/// Fetch pages until a short or empty page.
///
/// A failed page ends pagination: the error is logged and whatever was
/// collected so far is returned. Nothing is retried.
pub fn paginate<F>(page_size: usize, mut fetch_page: F, log: &mut dyn LogSink) -> Vec<Value>
where
    F: FnMut(usize, usize) -> Result<Vec<Value>, IngestError>,
{
    let page_size = page_size.max(1);
    let mut items = Vec::new();
    let mut offset = 0usize;

    loop {
        match fetch_page(offset, page_size) {
            Ok(page) => {
                let received = page.len();
                items.extend(page);
                log.emit(
                    LogEvent::debug("cloud", "fetched page")
                        .field("offset", offset)
                        .field("received", received)
                        .field("total", items.len()),
                );
                if received < page_size {
                    break;
                }
                offset += page_size;
            }
            Err(e) => {
                log.emit(
                    LogEvent::warn("cloud", "page request failed")
                        .field("offset", offset)
                        .field("error", e),
                );
                break;
            }
        }
    }

    log.emit(LogEvent::info("cloud", "listing complete").field("items", items.len()));
    items
}

/// Pull the `measures` array out of a listing response
pub fn extract_measures(body: &Value) -> Result<Vec<Value>, IngestError> {
    if let Some(status) = body.get("status").and_then(Value::as_str) {
        if status != "ok" {
            return Err(IngestError::ResponseError(format!("service status {status:?}")));
        }
    }
    match body.get("measures") {
        Some(Value::Array(measures)) => Ok(measures.clone()),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(other) => Err(IngestError::ResponseError(format!(
            "expected measures array, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{Level, MemorySink};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_login_redirect() {
        let login = "https://auth.example/login";
        let tokens = parse_login_redirect(
            "https://portal.example/login#id_token=abc.def&access_token=xyz&expires_in=3600",
            login,
        )
        .unwrap();
        assert_eq!(
            tokens,
            Tokens {
                id_token: "abc.def".to_string(),
                access_token: "xyz".to_string(),
            }
        );

        assert!(matches!(
            parse_login_redirect(login, login),
            Err(IngestError::AuthenticationError(_))
        ));
        assert!(parse_login_redirect("https://portal.example/login#id_token=a", login).is_err());
        assert!(parse_login_redirect("https://portal.example/login", login).is_err());
    }

    #[test]
    fn test_login_redirect_tokens_are_percent_decoded() {
        let tokens = parse_login_redirect(
            "https://portal.example/login#access_token=a%2Bb%3D%3D&id_token=x.y%2Fz",
            "https://auth.example/login",
        )
        .unwrap();
        assert_eq!(tokens.access_token, "a+b==");
        assert_eq!(tokens.id_token, "x.y/z");
    }

    #[test]
    fn test_paginate_stops_on_short_page() {
        let mut calls = Vec::new();
        let mut log = MemorySink::new();
        let items = paginate(
            2,
            |offset, count| {
                calls.push(offset);
                let remaining = 5usize.saturating_sub(offset).min(count);
                Ok((0..remaining).map(|i| json!(offset + i)).collect())
            },
            &mut log,
        );

        assert_eq!(items.len(), 5);
        assert_eq!(calls, vec![0, 2, 4]);
    }

    #[test]
    fn test_paginate_exact_multiple_ends_on_empty_page() {
        let mut calls = 0;
        let mut log = MemorySink::new();
        let items = paginate(
            2,
            |offset, _| {
                calls += 1;
                Ok(if offset < 4 { vec![json!(1), json!(2)] } else { Vec::new() })
            },
            &mut log,
        );
        assert_eq!(items.len(), 4);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_paginate_failure_keeps_collected_items() {
        let mut log = MemorySink::new();
        let items = paginate(
            1,
            |offset, _| {
                if offset == 0 {
                    Ok(vec![json!({"measure_id": "a"})])
                } else {
                    Err(IngestError::ResponseError("HTTP 500".to_string()))
                }
            },
            &mut log,
        );

        assert_eq!(items.len(), 1);
        assert_eq!(log.count(Level::Warn), 1);
    }

    #[test]
    fn test_query_params() {
        let query = MeasurementQuery {
            state: Some("finalized".to_string()),
            from: None,
            details: true,
        };
        let params = query.params(1000, 1000);
        assert_eq!(params[0], ("count".to_string(), "1000".to_string()));
        assert_eq!(params[1], ("offset".to_string(), "1000".to_string()));
        assert!(params.contains(&("details".to_string(), "yes".to_string())));
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_extract_measures() {
        let body = json!({"status": "ok", "measures": [{"measure_id": "m1"}]});
        assert_eq!(extract_measures(&body).unwrap().len(), 1);
        assert!(extract_measures(&json!({"status": "ok"})).unwrap().is_empty());
        assert!(extract_measures(&json!({"status": "error"})).is_err());
    }

    #[test]
    fn test_endpoint_join() {
        let config = CloudConfig::production();
        assert_eq!(
            config.endpoint("/v1/user/self"),
            "https://analysis.kubioscloud.com/v1/user/self"
        );
        assert_eq!(CloudConfig::staging().page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "user".to_string(),
            password: "secret".to_string(),
            client_id: "cid".to_string(),
        };
        assert!(!format!("{creds:?}").contains("secret"));
    }
}
