use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::LoginRequest;
use crate::config::{FrontendConfig, ServiceEndpoints};
use crate::permissions::{Capabilities, PermissionGrant};
use crate::types::{ErrorDetail, Job, JobCreatePayload, JobType, User};

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_REQUEST_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Auth,
    Users,
    Meal,
    Finance,
    Backups,
}

impl Service {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Users => "users",
            Self::Meal => "meal",
            Self::Finance => "finance",
            Self::Backups => "backups",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub endpoints: ServiceEndpoints,
    pub timeout_ms: u64,
    pub request_attempts: usize,
    pub accept_invalid_certs: bool,
}

impl ApiClientConfig {
    #[must_use]
    pub fn new(endpoints: ServiceEndpoints) -> Self {
        Self {
            endpoints,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            request_attempts: DEFAULT_REQUEST_ATTEMPTS,
            accept_invalid_certs: false,
        }
    }

    #[must_use]
    pub fn from_frontend(config: &FrontendConfig) -> Self {
        Self {
            endpoints: config.endpoints(),
            timeout_ms: config.request_timeout_ms,
            request_attempts: config.request_attempts,
            accept_invalid_certs: config.accept_invalid_certs,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("base url for the {service} service is missing")]
    BaseUrlMissing { service: &'static str },
    #[error("http client could not be built: {message}")]
    Build { message: String },
    #[error("request path is empty")]
    InvalidPath,
    #[error("request failed: {message}")]
    Request { message: String },
    #[error("response body could not be read: {message}")]
    Read { message: String },
    #[error("request failed with status {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("response body is not valid json: {message}")]
    Decode { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Success,
    // A body without a status is never taken as success.
    #[default]
    Error,
}

/// `{status, message, ...}` wrapper every backend response arrives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub status: ApiStatus,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub body: T,
}

impl<T: Default> ApiEnvelope<T> {
    pub fn success(body: T) -> Self {
        Self {
            status: ApiStatus::Success,
            message: String::new(),
            body,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Error,
            message: message.into(),
            body: T::default(),
        }
    }
}

impl<T> ApiEnvelope<T> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ApiStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoginBody {
    pub token: Option<String>,
    pub user: Option<User>,
}

/// Either a list of grants or a bare string sentinel such as `"*"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionsPayload {
    Grants(Vec<PermissionGrant>),
    Sentinel(String),
}

impl PermissionsPayload {
    #[must_use]
    pub fn into_capabilities(self) -> Capabilities {
        match self {
            Self::Grants(grants) => Capabilities::Grants(grants),
            Self::Sentinel(value) if is_wildcard(&value) => Capabilities::Wildcard,
            Self::Sentinel(value) => {
                warn!(sentinel = %value, "unrecognized permissions sentinel, granting nothing");
                Capabilities::Grants(Vec::new())
            }
        }
    }
}

fn is_wildcard(value: &str) -> bool {
    let value = value.trim();
    value == "*" || value.eq_ignore_ascii_case("all")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PermissionsBody {
    pub permissions: Option<PermissionsPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VersionBody {
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct JobTypesBody {
    pub job_types: Option<Vec<JobType>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct JobsBody {
    pub jobs: Option<Vec<Job>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CreateJobBody {
    pub job: Option<Job>,
    pub errors: Option<Vec<ErrorDetail>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EmptyBody {}

/// Backend operations the stores depend on. Failures come back as error
/// envelopes rather than `Err`.
#[async_trait]
pub trait AutomationApi: Send + Sync {
    /// Replaces the bearer credential used by every later request.
    fn set_token(&self, token: Option<&str>);
    async fn login(&self, request: &LoginRequest) -> ApiEnvelope<LoginBody>;
    async fn list_permissions(&self) -> ApiEnvelope<PermissionsBody>;
    async fn finance_version(&self) -> ApiEnvelope<VersionBody>;
    async fn list_job_types(&self) -> ApiEnvelope<JobTypesBody>;
    async fn list_jobs(&self) -> ApiEnvelope<JobsBody>;
    async fn create_job(&self, payload: &JobCreatePayload) -> ApiEnvelope<CreateJobBody>;
    async fn delete_job(&self, id: &str) -> ApiEnvelope<EmptyBody>;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    endpoints: ServiceEndpoints,
    timeout: Duration,
    request_attempts: usize,
    credential: Arc<RwLock<Option<String>>>,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig) -> Result<Self, ApiClientError> {
        let endpoints = ServiceEndpoints {
            auth: normalize_base_url(Service::Auth, &config.endpoints.auth)?,
            users: normalize_base_url(Service::Users, &config.endpoints.users)?,
            meal: normalize_base_url(Service::Meal, &config.endpoints.meal)?,
            finance: normalize_base_url(Service::Finance, &config.endpoints.finance)?,
            backups: normalize_base_url(Service::Backups, &config.endpoints.backups)?,
        };
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|error| ApiClientError::Build {
                message: error.to_string(),
            })?;
        Ok(Self {
            endpoints,
            timeout: Duration::from_millis(config.timeout_ms.max(250)),
            request_attempts: config.request_attempts.max(1),
            credential: Arc::new(RwLock::new(None)),
            http,
        })
    }

    pub fn from_frontend(config: &FrontendConfig) -> Result<Self, ApiClientError> {
        Self::new(ApiClientConfig::from_frontend(config))
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn base_url(&self, service: Service) -> &str {
        match service {
            Service::Auth => &self.endpoints.auth,
            Service::Users => &self.endpoints.users,
            Service::Meal => &self.endpoints.meal,
            Service::Finance => &self.endpoints.finance,
            Service::Backups => &self.endpoints.backups,
        }
    }

    #[must_use]
    pub fn endpoint(&self, service: Service, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        let base_url = self.base_url(service);
        if trimmed.starts_with('/') {
            Some(format!("{base_url}{trimmed}"))
        } else {
            Some(format!("{base_url}/{trimmed}"))
        }
    }

    #[must_use]
    pub fn login_path() -> &'static str {
        "/login"
    }

    #[must_use]
    pub fn permissions_path() -> &'static str {
        "/permissions/"
    }

    #[must_use]
    pub fn version_path() -> &'static str {
        "/"
    }

    #[must_use]
    pub fn job_types_path() -> &'static str {
        "/job-types"
    }

    #[must_use]
    pub fn jobs_path() -> &'static str {
        "/jobs/"
    }

    #[must_use]
    pub fn job_path(id: &str) -> String {
        format!("/jobs/{}", id.trim())
    }

    pub async fn get_json<T>(&self, service: Service, path: &str) -> Result<T, ApiClientError>
    where
        T: DeserializeOwned,
    {
        // Only reads are retried.
        let response = self
            .send(Method::GET, service, path, None::<&()>, self.request_attempts)
            .await?;
        decode_json_response(response).await
    }

    pub async fn post_json<Req, Res>(
        &self,
        service: Service,
        path: &str,
        payload: &Req,
    ) -> Result<Res, ApiClientError>
    where
        Req: Serialize + ?Sized + Sync,
        Res: DeserializeOwned,
    {
        let response = self
            .send(Method::POST, service, path, Some(payload), 1)
            .await?;
        decode_json_response(response).await
    }

    pub async fn delete_json<T>(&self, service: Service, path: &str) -> Result<T, ApiClientError>
    where
        T: DeserializeOwned,
    {
        let response = self
            .send(Method::DELETE, service, path, None::<&()>, 1)
            .await?;
        decode_json_response(response).await
    }

    async fn send<Req>(
        &self,
        method: Method,
        service: Service,
        path: &str,
        payload: Option<&Req>,
        attempts: usize,
    ) -> Result<reqwest::Response, ApiClientError>
    where
        Req: Serialize + ?Sized + Sync,
    {
        let url = self
            .endpoint(service, path)
            .ok_or(ApiClientError::InvalidPath)?;
        let token = self.token();
        let mut last_error: Option<String> = None;
        for attempt in 0..attempts.max(1) {
            let request_id = format!("req_{}", Uuid::new_v4().simple());
            let mut request = self
                .http
                .request(method.clone(), url.as_str())
                .header("x-request-id", request_id.as_str())
                .timeout(self.timeout);
            if let Some(token) = token.as_deref() {
                request = request.bearer_auth(token);
            }
            if let Some(payload) = payload {
                request = request.json(payload);
            }
            debug!(
                service = service.as_str(),
                method = %method,
                url = %url,
                request_id = %request_id,
                attempt,
                "api request"
            );
            match request.send().await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    last_error = Some(error.to_string());
                    if attempt + 1 >= attempts {
                        break;
                    }
                }
            }
        }
        Err(ApiClientError::Request {
            message: last_error.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[async_trait]
impl AutomationApi for ApiClient {
    fn set_token(&self, token: Option<&str>) {
        let token = token
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string);
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    async fn login(&self, request: &LoginRequest) -> ApiEnvelope<LoginBody> {
        fold_into_envelope(
            self.post_json(Service::Auth, Self::login_path(), request)
                .await,
        )
    }

    async fn list_permissions(&self) -> ApiEnvelope<PermissionsBody> {
        fold_into_envelope(
            self.get_json(Service::Users, Self::permissions_path())
                .await,
        )
    }

    async fn finance_version(&self) -> ApiEnvelope<VersionBody> {
        fold_into_envelope(self.get_json(Service::Finance, Self::version_path()).await)
    }

    async fn list_job_types(&self) -> ApiEnvelope<JobTypesBody> {
        fold_into_envelope(
            self.get_json(Service::Backups, Self::job_types_path())
                .await,
        )
    }

    async fn list_jobs(&self) -> ApiEnvelope<JobsBody> {
        fold_into_envelope(self.get_json(Service::Backups, Self::jobs_path()).await)
    }

    async fn create_job(&self, payload: &JobCreatePayload) -> ApiEnvelope<CreateJobBody> {
        fold_into_envelope(
            self.post_json(Service::Backups, Self::jobs_path(), payload)
                .await,
        )
    }

    async fn delete_job(&self, id: &str) -> ApiEnvelope<EmptyBody> {
        if id.trim().is_empty() {
            return ApiEnvelope::error(ApiClientError::InvalidPath.to_string());
        }
        fold_into_envelope(
            self.delete_json(Service::Backups, Self::job_path(id).as_str())
                .await,
        )
    }
}

/// Turns any client failure into an error envelope, keeping the backend's
/// `message` (and body fields such as `errors`) when the error body has them.
pub fn fold_into_envelope<T>(result: Result<ApiEnvelope<T>, ApiClientError>) -> ApiEnvelope<T>
where
    T: DeserializeOwned + Default,
{
    let error = match result {
        Ok(envelope) => return envelope,
        Err(error) => error,
    };
    warn!(error = %error, "api request failed");
    if let ApiClientError::Http { status, body } = &error {
        if let Ok(mut envelope) = serde_json::from_str::<ApiEnvelope<T>>(body) {
            envelope.status = ApiStatus::Error;
            if envelope.message.trim().is_empty() {
                envelope.message = format!("request failed with status {status}");
            }
            return envelope;
        }
    }
    ApiEnvelope::error(error.to_string())
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> ApiClientError {
    let body = non_empty_string(String::from_utf8_lossy(body).to_string())
        .unwrap_or_else(|| "<empty>".to_string());
    ApiClientError::Http { status, body }
}

fn normalize_base_url(service: Service, base_url: &str) -> Result<String, ApiClientError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(ApiClientError::BaseUrlMissing {
            service: service.as_str(),
        });
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, ApiClientError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|error| ApiClientError::Read {
            message: error.to_string(),
        })?;

    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| ApiClientError::Decode {
        message: error.to_string(),
    })
}

fn non_empty_string(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
