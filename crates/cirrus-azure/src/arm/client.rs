//! HTTP client for Azure Resource Manager

use super::Arm;
use super::auth::{DEFAULT_AUTHORITY, TokenCredential};
use async_trait::async_trait;
use cirrus_cloud::{CloudError, Result};
use cirrus_config::AzureCredentials;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;

const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Endpoint and long-running-operation settings
#[derive(Debug, Clone)]
pub struct ArmClientConfig {
    /// Management endpoint (override for sovereign clouds)
    pub endpoint: String,

    /// Login endpoint tokens are requested from
    pub authority: String,

    /// First delay before polling an operation
    pub initial_poll_interval: Duration,

    /// Upper bound for the delay between polls
    pub max_poll_interval: Duration,

    /// Backoff multiplier between polls
    pub backoff_multiplier: f64,

    /// Give up waiting for an operation after this long
    pub operation_timeout: Duration,
}

impl Default for ArmClientConfig {
    fn default() -> Self {
        Self {
            endpoint: MANAGEMENT_ENDPOINT.to_string(),
            authority: DEFAULT_AUTHORITY.to_string(),
            initial_poll_interval: Duration::from_secs(2),
            max_poll_interval: Duration::from_secs(30),
            backoff_multiplier: 1.5,
            operation_timeout: Duration::from_secs(60 * 60),
        }
    }
}

/// Where to ask for the outcome of an accepted write
#[derive(Debug, Clone, PartialEq)]
enum Pending {
    /// `Azure-AsyncOperation`: body carries `status`
    AsyncOperation(String),
    /// `Location`: 202 while running
    Location(String),
}

impl Pending {
    fn from_response(status: StatusCode, headers: &HeaderMap) -> Option<Self> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };

        if let Some(url) = header("azure-asyncoperation") {
            return Some(Pending::AsyncOperation(url));
        }
        if status == StatusCode::ACCEPTED {
            return header("location").map(Pending::Location);
        }
        None
    }
}

/// Management API client authenticated with a service principal
pub struct ArmClient {
    http: reqwest::Client,
    credential: TokenCredential,
    subscription_id: String,
    config: ArmClientConfig,
}

impl ArmClient {
    pub fn new(credentials: AzureCredentials) -> Result<Self> {
        Self::with_config(credentials, ArmClientConfig::default())
    }

    pub fn with_config(credentials: AzureCredentials, config: ArmClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("cirrus/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CloudError::OperationFailed(format!("HTTP client: {}", e)))?;

        Ok(Self {
            subscription_id: credentials.subscription_id.clone(),
            credential: TokenCredential::new(http.clone(), credentials)
                .with_authority(config.authority.clone()),
            http,
            config,
        })
    }

    fn url(&self, path: &str, api_version: &str) -> String {
        if path.starts_with("https://") || path.starts_with("http://") {
            return path.to_string();
        }
        let separator = if path.contains('?') { '&' } else { '?' };
        format!(
            "{}{}{}api-version={}",
            self.config.endpoint, path, separator, api_version
        )
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, HeaderMap, Value)> {
        tracing::debug!("{} {}", method, url);

        let token = self.credential.token().await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CloudError::OperationFailed(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .map_err(|e| CloudError::OperationFailed(e.to_string()))?;

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };

        Ok((status, headers, value))
    }

    /// Block until an accepted write has finished
    async fn wait(&self, pending: Pending) -> Result<()> {
        let started = tokio::time::Instant::now();
        let mut delay = self.config.initial_poll_interval;

        loop {
            tokio::time::sleep(delay).await;

            let done = match &pending {
                Pending::AsyncOperation(url) => {
                    let (status, _, body) = self.send(Method::GET, url, None).await?;
                    check_status(status, &body)?;
                    operation_finished(&body)?
                }
                Pending::Location(url) => {
                    let (status, _, body) = self.send(Method::GET, url, None).await?;
                    check_status(status, &body)?;
                    status != StatusCode::ACCEPTED
                }
            };

            if done {
                return Ok(());
            }

            if started.elapsed() > self.config.operation_timeout {
                return Err(CloudError::Timeout(format!(
                    "operation did not finish within {:?}",
                    self.config.operation_timeout
                )));
            }

            delay = delay
                .mul_f64(self.config.backoff_multiplier)
                .min(self.config.max_poll_interval);
        }
    }

    async fn write(&self, method: Method, id: &str, api_version: &str, body: &Value) -> Result<Value> {
        let url = self.url(id, api_version);
        let (status, headers, response) = self.send(method, &url, Some(body)).await?;
        check_status(status, &response)?;

        if let Some(pending) = Pending::from_response(status, &headers) {
            self.wait(pending).await?;
            return self
                .get(id, api_version)
                .await?
                .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()));
        }

        Ok(response)
    }
}

/// Map an ARM error body to `ApiError`
fn check_status(status: StatusCode, body: &Value) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }

    let error = body.get("error").unwrap_or(body);
    Err(CloudError::ApiError {
        status: status.as_u16(),
        code: error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string(),
        message: error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed"))
            .to_string(),
    })
}

/// Interpret an `Azure-AsyncOperation` status document
fn operation_finished(body: &Value) -> Result<bool> {
    match body.get("status").and_then(Value::as_str) {
        Some(s) if s.eq_ignore_ascii_case("succeeded") => Ok(true),
        Some(s) if s.eq_ignore_ascii_case("failed") || s.eq_ignore_ascii_case("canceled") => {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or(s);
            Err(CloudError::OperationFailed(message.to_string()))
        }
        _ => Ok(false),
    }
}

#[async_trait]
impl Arm for ArmClient {
    fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    async fn get(&self, id: &str, api_version: &str) -> Result<Option<Value>> {
        let url = self.url(id, api_version);
        let (status, _, body) = self.send(Method::GET, &url, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(status, &body)?;
        Ok(Some(body))
    }

    async fn put(&self, id: &str, api_version: &str, body: &Value) -> Result<Value> {
        tracing::info!("PUT {}", id);
        self.write(Method::PUT, id, api_version, body).await
    }

    async fn patch(&self, id: &str, api_version: &str, body: &Value) -> Result<Value> {
        tracing::info!("PATCH {}", id);
        self.write(Method::PATCH, id, api_version, body).await
    }

    async fn post(&self, path: &str, api_version: &str, body: Option<&Value>) -> Result<Value> {
        tracing::info!("POST {}", path);
        let url = self.url(path, api_version);
        let (status, headers, response) = self.send(Method::POST, &url, body).await?;
        check_status(status, &response)?;
        if let Some(pending) = Pending::from_response(status, &headers) {
            self.wait(pending).await?;
        }
        Ok(response)
    }

    async fn delete(&self, id: &str, api_version: &str) -> Result<()> {
        tracing::info!("DELETE {}", id);
        let url = self.url(id, api_version);
        let (status, headers, body) = self.send(Method::DELETE, &url, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(status, &body)?;
        if let Some(pending) = Pending::from_response(status, &headers) {
            self.wait(pending).await?;
        }
        Ok(())
    }

    async fn list(&self, path: &str, api_version: &str) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut next = Some(self.url(path, api_version));

        while let Some(url) = next.take() {
            let (status, _, body) = self.send(Method::GET, &url, None).await?;
            if status == StatusCode::NOT_FOUND {
                break;
            }
            check_status(status, &body)?;

            if let Some(page) = body.get("value").and_then(Value::as_array) {
                items.extend(page.iter().cloned());
            }
            next = body
                .get("nextLink")
                .and_then(Value::as_str)
                .map(String::from);
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DISK: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/disks/data";

    fn client() -> ArmClient {
        ArmClient::new(AzureCredentials {
            tenant_id: "t".into(),
            client_id: "c".into(),
            client_secret: "s".into(),
            subscription_id: "sub".into(),
        })
        .unwrap()
    }

    #[test]
    fn test_url_building() {
        let client = client();
        assert_eq!(
            client.url("/subscriptions/sub/resourcegroups", "2021-04-01"),
            "https://management.azure.com/subscriptions/sub/resourcegroups?api-version=2021-04-01"
        );
        assert_eq!(
            client.url("/x?$filter=a", "1"),
            "https://management.azure.com/x?$filter=a&api-version=1"
        );
        assert_eq!(
            client.url("https://management.azure.com/next?page=2", "1"),
            "https://management.azure.com/next?page=2"
        );
    }

    #[test]
    fn test_check_status_maps_arm_error() {
        let body = json!({"error": {"code": "InvalidResourceName", "message": "bad name"}});
        let err = check_status(StatusCode::BAD_REQUEST, &body).unwrap_err();
        match err {
            CloudError::ApiError {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, "InvalidResourceName");
                assert_eq!(message, "bad name");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_operation_status() {
        assert!(operation_finished(&json!({"status": "Succeeded"})).unwrap());
        assert!(!operation_finished(&json!({"status": "InProgress"})).unwrap());
        let err = operation_finished(&json!({
            "status": "Failed",
            "error": {"message": "quota exceeded"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_pending_detection() {
        let mut headers = HeaderMap::new();
        assert_eq!(Pending::from_response(StatusCode::OK, &headers), None);

        headers.insert("location", HeaderValue::from_static("https://poll/1"));
        assert_eq!(Pending::from_response(StatusCode::OK, &headers), None);
        assert_eq!(
            Pending::from_response(StatusCode::ACCEPTED, &headers),
            Some(Pending::Location("https://poll/1".to_string()))
        );

        headers.insert("azure-asyncoperation", HeaderValue::from_static("https://op/1"));
        assert_eq!(
            Pending::from_response(StatusCode::CREATED, &headers),
            Some(Pending::AsyncOperation("https://op/1".to_string()))
        );
    }

    /// Client whose management and login endpoints both point at `server`
    async fn mock_client(server: &MockServer) -> ArmClient {
        Mock::given(method("POST"))
            .and(path("/t/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "access_token": "test-token",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(server)
            .await;

        let config = ArmClientConfig {
            endpoint: server.uri(),
            authority: server.uri(),
            initial_poll_interval: Duration::from_millis(1),
            max_poll_interval: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            operation_timeout: Duration::from_secs(5),
        };
        ArmClient::with_config(
            AzureCredentials {
                tenant_id: "t".into(),
                client_id: "c".into(),
                client_secret: "s".into(),
                subscription_id: "sub".into(),
            },
            config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_list_follows_next_link_with_one_token() {
        let server = MockServer::start().await;
        let client = mock_client(&server).await;

        Mock::given(method("GET"))
            .and(path("/subscriptions/sub/providers/Microsoft.Compute/disks"))
            .and(query_param("api-version", "2023-04-02"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "name": "a" }],
                "nextLink": format!("{}/next?page=2", server.uri()),
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/next"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "value": [{ "name": "b" }] })),
            )
            .mount(&server)
            .await;

        let items = client
            .list("/subscriptions/sub/providers/Microsoft.Compute/disks", "2023-04-02")
            .await
            .unwrap();
        let names: Vec<&str> = items.iter().filter_map(|i| i["name"].as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_missing_objects() {
        let server = MockServer::start().await;
        let client = mock_client(&server).await;

        Mock::given(path(DISK))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": "ResourceNotFound", "message": "not found" }
            })))
            .mount(&server)
            .await;

        assert!(client.get(DISK, "1").await.unwrap().is_none());
        client.delete(DISK, "1").await.unwrap();
    }

    #[tokio::test]
    async fn test_error_body_becomes_api_error() {
        let server = MockServer::start().await;
        let client = mock_client(&server).await;

        Mock::given(method("PUT"))
            .and(path(DISK))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": { "code": "OperationNotAllowed", "message": "disk is attached" }
            })))
            .mount(&server)
            .await;

        let err = client.put(DISK, "1", &json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            CloudError::ApiError { status: 409, ref code, .. } if code == "OperationNotAllowed"
        ));
    }

    #[tokio::test]
    async fn test_put_polls_async_operation() {
        let server = MockServer::start().await;
        let client = mock_client(&server).await;
        let operation = format!("{}/operations/1", server.uri());

        Mock::given(method("PUT"))
            .and(path(DISK))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Azure-AsyncOperation", operation.as_str())
                    .set_body_json(json!({ "properties": { "provisioningState": "Updating" } })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "InProgress" })))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "Succeeded" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(DISK))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "data",
                "properties": { "provisioningState": "Succeeded" },
            })))
            .mount(&server)
            .await;

        let live = client.put(DISK, "1", &json!({})).await.unwrap();
        assert_eq!(live["properties"]["provisioningState"], "Succeeded");
    }

    #[tokio::test]
    async fn test_failed_operation_is_reported() {
        let server = MockServer::start().await;
        let client = mock_client(&server).await;
        let operation = format!("{}/operations/2", server.uri());

        Mock::given(method("PUT"))
            .and(path(DISK))
            .respond_with(
                ResponseTemplate::new(201).insert_header("Azure-AsyncOperation", operation.as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "Failed",
                "error": { "code": "QuotaExceeded", "message": "quota exceeded" },
            })))
            .mount(&server)
            .await;

        let err = client.put(DISK, "1", &json!({})).await.unwrap_err();
        assert!(matches!(err, CloudError::OperationFailed(ref m) if m == "quota exceeded"));
    }

    #[tokio::test]
    async fn test_delete_polls_location() {
        let server = MockServer::start().await;
        let client = mock_client(&server).await;
        let location = format!("{}/locations/3", server.uri());

        Mock::given(method("DELETE"))
            .and(path(DISK))
            .respond_with(ResponseTemplate::new(202).insert_header("Location", location.as_str()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/locations/3"))
            .respond_with(ResponseTemplate::new(202).insert_header("Location", location.as_str()))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/locations/3"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client.delete(DISK, "1").await.unwrap();
    }

    #[tokio::test]
    async fn test_operation_times_out() {
        let server = MockServer::start().await;
        let mut client = mock_client(&server).await;
        client.config.operation_timeout = Duration::from_millis(20);
        let operation = format!("{}/operations/4", server.uri());

        Mock::given(method("DELETE"))
            .and(path(DISK))
            .respond_with(
                ResponseTemplate::new(202).insert_header("Azure-AsyncOperation", operation.as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "InProgress" })))
            .mount(&server)
            .await;

        let err = client.delete(DISK, "1").await.unwrap_err();
        assert!(matches!(err, CloudError::Timeout(_)));
    }
}
