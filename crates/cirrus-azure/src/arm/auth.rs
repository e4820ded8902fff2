//! OAuth2 client-credentials tokens for the management API

use chrono::{DateTime, Duration, Utc};
use cirrus_cloud::{CloudError, Result};
use cirrus_config::AzureCredentials;
use serde::Deserialize;
use tokio::sync::Mutex;

pub(crate) const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Tokens are renewed this long before they expire
const REFRESH_MARGIN_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Service principal token source with an in-memory cache
pub struct TokenCredential {
    http: reqwest::Client,
    authority: String,
    credentials: AzureCredentials,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenCredential {
    pub fn new(http: reqwest::Client, credentials: AzureCredentials) -> Self {
        Self {
            http,
            authority: DEFAULT_AUTHORITY.to_string(),
            credentials,
            cached: Mutex::new(None),
        }
    }

    /// Override the login endpoint (sovereign clouds)
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    /// A bearer token valid for at least the refresh margin
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.token.clone());
        }

        let fresh = self.request_token().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn request_token(&self) -> Result<AccessToken> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority, self.credentials.tenant_id
        );
        tracing::debug!("Requesting management token from {}", url);

        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("scope", MANAGEMENT_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| CloudError::AuthenticationFailed(e.to_string()))?;

        let status = response.status();
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| CloudError::AuthenticationFailed(e.to_string()))?;

        match (status.is_success(), body.access_token) {
            (true, Some(token)) => Ok(AccessToken {
                token,
                expires_at: Utc::now() + Duration::seconds(body.expires_in.unwrap_or(3600)),
            }),
            _ => Err(CloudError::AuthenticationFailed(
                body.error_description
                    .or(body.error)
                    .unwrap_or_else(|| format!("token endpoint returned {}", status)),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential(server: &MockServer) -> TokenCredential {
        TokenCredential::new(
            reqwest::Client::new(),
            AzureCredentials {
                tenant_id: "tenant".into(),
                client_id: "client".into(),
                client_secret: "secret".into(),
                subscription_id: "sub".into(),
            },
        )
        .with_authority(server.uri())
    }

    fn token_endpoint() -> wiremock::MockBuilder {
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .and(body_string_contains("client_id=client"))
    }

    #[test]
    fn test_token_freshness_respects_margin() {
        let now = Utc::now();
        let token = |secs| AccessToken {
            token: "t".to_string(),
            expires_at: now + Duration::seconds(secs),
        };

        assert!(token(3600).is_fresh(now));
        assert!(!token(REFRESH_MARGIN_SECS).is_fresh(now));
        assert!(!token(-10).is_fresh(now));
    }

    #[test]
    fn test_token_response_error_shape() {
        let body: TokenResponse = serde_json::from_str(
            r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret"}"#,
        )
        .unwrap();
        assert!(body.access_token.is_none());
        assert_eq!(body.error.as_deref(), Some("invalid_client"));
    }

    #[tokio::test]
    async fn test_token_is_cached() {
        let server = MockServer::start().await;
        token_endpoint()
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "first",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credential = credential(&server);
        assert_eq!(credential.token().await.unwrap(), "first");
        assert_eq!(credential.token().await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_token_inside_margin_is_renewed() {
        let server = MockServer::start().await;
        token_endpoint()
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "short-lived",
                "expires_in": REFRESH_MARGIN_SECS - 60,
            })))
            .expect(2)
            .mount(&server)
            .await;

        let credential = credential(&server);
        credential.token().await.unwrap();
        credential.token().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_secret() {
        let server = MockServer::start().await;
        token_endpoint()
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret",
            })))
            .mount(&server)
            .await;

        let err = credential(&server).token().await.unwrap_err();
        assert!(matches!(err, CloudError::AuthenticationFailed(ref m) if m.contains("AADSTS7000215")));
    }
}
