use super::MigrationBackend;
use super::constants::{self, headers, methods};
use super::models::{
    ConnectRequest, ConnectionResponse, ErrorBody, MigrationRequest, MigrationResponse,
    ProgressResponse, TablePreviewResponse, TablesResponse,
};
use super::resilience::{
    ApiLogger, OperationContext, RateLimiter, RateLimiterStats, ResilienceConfig, RetryPolicy,
};
use crate::config::{BackendConfig, ResilienceSettings};
use crate::connection::Role;
use crate::error::ApiError;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Migration backend client over HTTP with connection pooling
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    source_path: String,
    target_path: String,
    http_client: reqwest::Client,
    request_timeout: Duration,
    // `None` waits for the backend however long the transfer takes
    migrate_timeout: Option<Duration>,
    retry_policy: RetryPolicy,
    rate_limiter: RateLimiter,
    api_logger: ApiLogger,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_resilience(base_url, ResilienceConfig::default())
    }

    pub fn with_resilience(
        base_url: impl Into<String>,
        resilience: ResilienceConfig,
    ) -> Result<Self, ApiError> {
        let http_client = build_http_client(DEFAULT_CONNECT_TIMEOUT)?;
        Ok(Self::with_custom_client(base_url, http_client, resilience))
    }

    /// Create a backend around an already configured HTTP client
    pub fn with_custom_client(
        base_url: impl Into<String>,
        http_client: reqwest::Client,
        resilience: ResilienceConfig,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            source_path: Role::Source.as_str().to_string(),
            target_path: Role::Target.as_str().to_string(),
            http_client,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            migrate_timeout: None,
            retry_policy: RetryPolicy::new(resilience.retry),
            rate_limiter: RateLimiter::new(resilience.rate_limit),
            api_logger: ApiLogger::new(resilience.request_logging),
        }
    }

    pub fn from_config(
        backend: &BackendConfig,
        resilience: &ResilienceSettings,
    ) -> Result<Self, ApiError> {
        let http_client = build_http_client(Duration::from_secs(backend.connect_timeout_secs))?;
        let resilience = ResilienceConfig::from_settings(resilience);

        Ok(Self::with_custom_client(&backend.base_url, http_client, resilience)
            .with_role_paths(&backend.source_path, &backend.target_path)
            .with_timeouts(
                Duration::from_secs(backend.request_timeout_secs),
                backend.migrate_timeout_secs.map(Duration::from_secs),
            ))
    }

    /// `request` bounds each read and connect call; `migrate` bounds the
    /// transfer POST, which otherwise waits until the backend answers
    pub fn with_timeouts(mut self, request: Duration, migrate: Option<Duration>) -> Self {
        self.request_timeout = request;
        self.migrate_timeout = migrate;
        self
    }

    /// Override the `{role}` path segments (e.g. `retool` / `supabase`)
    pub fn with_role_paths(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_path = source.into();
        self.target_path = target.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn rate_limiter_stats(&self) -> RateLimiterStats {
        self.rate_limiter.stats()
    }

    fn role_segment(&self, role: Role) -> &str {
        match role {
            Role::Source => &self.source_path,
            Role::Target => &self.target_path,
        }
    }

    /// GET with retries; used for every read-only endpoint
    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        resource: &str,
        url: &str,
    ) -> Result<T, ApiError> {
        let context = self.api_logger.start_operation(operation, resource);

        let result = self
            .retry_policy
            .execute(|| async {
                self.rate_limiter.acquire().await;
                self.api_logger.log_request(&context, methods::GET, url);

                let response = self
                    .http_client
                    .get(url)
                    .header(headers::ACCEPT, headers::CONTENT_TYPE_JSON)
                    .timeout(self.request_timeout)
                    .send()
                    .await?;

                self.api_logger.log_response(&context, response.status().as_u16());
                read_json(response).await
            })
            .await;

        self.complete(&context, &result);
        result
    }

    /// POST a JSON body; retried only when `retry` is set
    async fn post_json<B, T>(
        &self,
        operation: &str,
        resource: &str,
        url: &str,
        body: &B,
        retry: bool,
        timeout: Option<Duration>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let context = self.api_logger.start_operation(operation, resource);

        let send = || async {
            self.rate_limiter.acquire().await;
            self.api_logger.log_request(&context, methods::POST, url);

            let mut request = self.http_client.post(url).json(body);
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }
            let response = request.send().await?;

            self.api_logger.log_response(&context, response.status().as_u16());
            read_json(response).await
        };

        let result = if retry {
            self.retry_policy.execute(send).await
        } else {
            send().await
        };

        self.complete(&context, &result);
        result
    }

    fn complete<T>(&self, context: &OperationContext, result: &Result<T, ApiError>) {
        match result {
            Ok(_) => self.api_logger.complete_operation(context, None),
            Err(err) => self.api_logger.complete_operation(context, Some(&err.to_string())),
        }
    }
}

#[async_trait]
impl MigrationBackend for HttpBackend {
    async fn connect(
        &self,
        role: Role,
        connection_string: &str,
    ) -> Result<ConnectionResponse, ApiError> {
        let segment = self.role_segment(role);
        let url = constants::connect_endpoint(&self.base_url, segment);
        let body = ConnectRequest { connection_string };
        let timeout = Some(self.request_timeout);
        self.post_json("connect", segment, &url, &body, true, timeout)
            .await
    }

    async fn list_tables(&self, role: Role) -> Result<TablesResponse, ApiError> {
        let segment = self.role_segment(role);
        let url = constants::tables_endpoint(&self.base_url, segment);
        self.get_json("list_tables", segment, &url).await
    }

    async fn preview_table(
        &self,
        role: Role,
        table: &str,
    ) -> Result<TablePreviewResponse, ApiError> {
        let segment = self.role_segment(role);
        let url = constants::preview_endpoint(&self.base_url, segment, table);
        let resource = format!("{}/{}", segment, table);
        self.get_json("preview", &resource, &url).await
    }

    async fn migrate(&self, request: &MigrationRequest) -> Result<MigrationResponse, ApiError> {
        let url = constants::migrate_endpoint(&self.base_url);
        let resource = format!("{} -> {}", request.source_table, request.target_table);
        // Not idempotent: a retried POST would start a second transfer
        self.post_json("migrate", &resource, &url, request, false, self.migrate_timeout)
            .await
    }

    async fn migration_progress(&self) -> Result<ProgressResponse, ApiError> {
        let url = constants::progress_endpoint(&self.base_url);
        self.get_json("progress", "migration", &url).await
    }
}

/// No client-wide timeout: each request sets its own
fn build_http_client(connect_timeout: Duration) -> Result<reqwest::Client, ApiError> {
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .connect_timeout(connect_timeout)
        .user_agent(constants::USER_AGENT)
        .build()?;
    Ok(client)
}

/// Decode a success body, or turn a non-2xx answer into [`ApiError::Status`]
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|parsed| parsed.message.or(parsed.error))
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                trimmed.to_string()
            }
        });

    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}
