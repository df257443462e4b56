//! Blocking HTTP client for the measurement service

use super::{extract_measures, paginate, parse_login_redirect, CloudConfig, Credentials, MeasurementQuery, Tokens};
use crate::error::IngestError;
use crate::logging::{LogEvent, LogSink};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION, USER_AGENT};
use reqwest::redirect::Policy;
use serde_json::Value;
use uuid::Uuid;

/// Authenticated measurement service client
pub struct CloudClient {
    config: CloudConfig,
    http: Client,
    tokens: Tokens,
}

impl CloudClient {
    /// Log in with username/password and keep the issued tokens
    pub fn login(
        config: CloudConfig,
        credentials: &Credentials,
        log: &mut dyn LogSink,
    ) -> Result<Self, IngestError> {
        let http = Client::builder().redirect(Policy::none()).build()?;
        let csrf = Uuid::new_v4().to_string();

        log.emit(
            LogEvent::info("cloud", "authenticating")
                .field("login_url", &config.login_url)
                .field("client_id", &credentials.client_id),
        );

        let form = [
            ("client_id", credentials.client_id.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("response_type", "token"),
            ("scope", "openid"),
            ("_csrf", csrf.as_str()),
        ];

        let response = http
            .post(&config.login_url)
            .header(COOKIE, format!("XSRF-TOKEN={csrf}"))
            .header(USER_AGENT, &config.user_agent)
            .form(&form)
            .send()?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(IngestError::AuthenticationError(format!("login returned HTTP {status}")));
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| IngestError::AuthenticationError(format!("HTTP {status} without redirect")))?;

        let tokens = parse_login_redirect(location, &config.login_url)?;
        log.emit(LogEvent::info("cloud", "authenticated"));

        Ok(Self {
            config,
            http,
            tokens,
        })
    }

    /// Build a client from previously issued tokens
    pub fn with_tokens(config: CloudConfig, tokens: Tokens) -> Result<Self, IngestError> {
        let http = Client::builder().redirect(Policy::none()).build()?;
        Ok(Self {
            config,
            http,
            tokens,
        })
    }

    pub fn tokens(&self) -> &Tokens {
        &self.tokens
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(AUTHORIZATION, &self.tokens.id_token)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, &self.config.user_agent)
    }

    fn get_json(&self, path: &str, params: &[(String, String)]) -> Result<Value, IngestError> {
        let url = self.config.endpoint(path);
        let response = self
            .authorized(self.http.get(&url))
            .query(params)
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    fn post_json(&self, path: &str, body: &Value) -> Result<Value, IngestError> {
        let url = self.config.endpoint(path);
        let response = self
            .authorized(self.http.post(&url))
            .json(body)
            .send()?
            .error_for_status()?;
        Ok(response.json()?)
    }

    /// User details (`user_id` may be "self")
    pub fn user_info(&self, user_id: &str) -> Result<Value, IngestError> {
        self.get_json(&format!("v1/user/{user_id}"), &[])
    }

    /// All measurements of a user, following pagination.
    ///
    /// Failures are logged and end the listing early.
    pub fn measurements(
        &self,
        user_id: &str,
        query: &MeasurementQuery,
        log: &mut dyn LogSink,
    ) -> Vec<Value> {
        let path = format!("v2/measure/{user_id}/session");
        paginate(
            self.config.page_size,
            |offset, count| {
                let body = self.get_json(&path, &query.params(offset, count))?;
                extract_measures(&body)
            },
            log,
        )
    }

    /// One measurement session
    pub fn measurement(&self, user_id: &str, measurement_id: &str) -> Result<Value, IngestError> {
        self.get_json(&format!("v2/measure/{user_id}/session/{measurement_id}"), &[])
    }

    /// Analysis results (HRV, readiness) of a user
    pub fn results(&self, user_id: &str) -> Result<Value, IngestError> {
        self.get_json(&format!("v1/result/{user_id}"), &[])
    }

    /// Subjects owned by the authenticated user
    pub fn subjects(&self) -> Result<Value, IngestError> {
        self.get_json("v2/measure/self/subject", &[])
    }

    /// Create a subject
    pub fn create_subject(&self, subject: &Value) -> Result<Value, IngestError> {
        self.post_json("v2/measure/self/subject", subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_client_from_saved_tokens() {
        let tokens = Tokens {
            id_token: "id".to_string(),
            access_token: "access".to_string(),
        };
        let client = CloudClient::with_tokens(CloudConfig::staging(), tokens.clone()).unwrap();
        assert_eq!(client.tokens(), &tokens);
    }
}
