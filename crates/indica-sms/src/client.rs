// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Twilio Messages API.
//!
//! Provides [`TwilioClient`], which builds the form request, authenticates
//! with the account credentials and maps error bodies into provider errors.
//! It makes exactly one attempt per call.

use std::time::Duration;

use indica_core::IndicaError;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use tracing::debug;

use crate::types::{ApiErrorResponse, MessageResource, SendMessageForm};

/// HTTP client for Twilio API communication.
#[derive(Debug, Clone)]
pub struct TwilioClient {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    base_url: String,
}

impl TwilioClient {
    /// Creates a client for `account_sid` against `base_url`
    /// (for example `https://api.twilio.com`).
    pub fn new(
        account_sid: String,
        auth_token: String,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, IndicaError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndicaError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            account_sid,
            auth_token,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        )
    }

    /// Creates one outbound message and returns the created resource.
    pub async fn create_message(
        &self,
        to: &str,
        from: &str,
        body: &str,
    ) -> Result<MessageResource, IndicaError> {
        let form = serde_urlencoded::to_string(SendMessageForm { to, from, body }).map_err(|e| {
            IndicaError::Provider {
                message: format!("failed to encode message form: {e}"),
                source: Some(Box::new(e)),
            }
        })?;

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            )
            .body(form)
            .send()
            .await
            .map_err(|e| IndicaError::Provider {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| IndicaError::Provider {
            message: format!("failed to read response body: {e}"),
            source: Some(Box::new(e)),
        })?;
        debug!(status = %status, "message create response received");

        if status.is_success() {
            return serde_json::from_str::<MessageResource>(&body).map_err(|e| {
                IndicaError::Provider {
                    message: format!("failed to parse API response: {e}"),
                    source: Some(Box::new(e)),
                }
            });
        }

        let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(api_err) => match api_err.code {
                Some(code) => format!("Twilio API error {code}: {}", api_err.message),
                None => format!("Twilio API error: {}", api_err.message),
            },
            Err(_) => format!("API returned {status}: {body}"),
        };
        Err(IndicaError::Provider {
            message,
            source: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SID: &str = "AC0000000000";

    fn test_client(base_url: &str) -> TwilioClient {
        TwilioClient::new(
            SID.into(),
            "secret".into(),
            base_url,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn messages_path() -> String {
        format!("/2010-04-01/Accounts/{SID}/Messages.json")
    }

    #[tokio::test]
    async fn create_message_success() {
        let server = MockServer::start().await;
        let expected_auth = format!("Basic {}", STANDARD.encode(format!("{SID}:secret")));

        Mock::given(method("POST"))
            .and(path(messages_path()))
            .and(header("authorization", expected_auth.as_str()))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("To=%2B5511999990000"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "sid": "SM123",
                "status": "queued"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let created = client
            .create_message("+5511999990000", "+15550001111", "hello")
            .await
            .unwrap();
        assert_eq!(created.sid, "SM123");
        assert_eq!(created.status.as_deref(), Some("queued"));
    }

    #[tokio::test]
    async fn create_message_maps_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(messages_path()))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": 21211,
                "message": "The 'To' number is not a valid phone number.",
                "more_info": "https://www.twilio.com/docs/errors/21211",
                "status": 400
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .create_message("+5511999990000", "+15550001111", "hello")
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("21211"), "got: {msg}");
        assert!(matches!(err, IndicaError::Provider { .. }));
    }

    #[tokio::test]
    async fn non_json_error_keeps_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&format!("{}/", server.uri()));
        let err = client.create_message("+5511999990000", "", "x").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("503"), "got: {msg}");
        assert!(msg.contains("upstream down"), "got: {msg}");
    }
}
