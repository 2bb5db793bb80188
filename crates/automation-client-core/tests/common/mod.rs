//! In-process stand-in for the dashboard backends.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use automation_client_core::{
    ApiEnvelope, AutomationApi, CapabilityRoute, CreateJobBody, EmptyBody, ErrorDetail,
    FieldDescriptor, FieldType, Job, JobCreatePayload, JobType, JobTypesBody, JobsBody,
    LoginBody, LoginRequest, PermissionGrant, PermissionsBody, PermissionsPayload, User,
    VersionBody,
};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{TimeDelta, Utc};
use tokio::sync::Semaphore;

pub const PASSWORD: &str = "correct horse";

pub fn token_expiring_at(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u-1","exp":{exp}}}"#));
    format!("{header}.{payload}.sig")
}

pub fn live_token() -> String {
    token_expiring_at((Utc::now() + TimeDelta::hours(6)).timestamp())
}

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        display_name: "Ada".to_string(),
        email: "ada@home.example".to_string(),
        profile_picture_url: String::new(),
    }
}

pub fn restic() -> JobType {
    JobType {
        id: "jt-1".to_string(),
        identifier: "restic".to_string(),
        name: "Restic".to_string(),
        configuration_fields: vec![
            FieldDescriptor::new("repository", FieldType::String, "Target repository"),
            FieldDescriptor::new("keepLast", FieldType::Number, "Snapshots to keep"),
        ],
    }
}

pub fn rsync() -> JobType {
    JobType {
        id: "jt-2".to_string(),
        identifier: "rsync".to_string(),
        name: "Rsync".to_string(),
        configuration_fields: vec![FieldDescriptor::new(
            "target",
            FieldType::String,
            "Destination host",
        )],
    }
}

pub struct FakeApi {
    pub token: Mutex<Option<String>>,
    pub login_token: Mutex<String>,
    pub grants: Mutex<Vec<PermissionGrant>>,
    pub permissions_fail: Mutex<bool>,
    pub reject_create_with: Mutex<Option<Vec<ErrorDetail>>>,
    pub created: Mutex<Vec<JobCreatePayload>>,
    pub login_calls: AtomicUsize,
    pub permission_calls: AtomicUsize,
    /// Login requests wait for a permit. Open by default.
    pub login_gate: Semaphore,
    /// Permission requests wait for a permit. Open by default.
    pub permission_gate: Semaphore,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            token: Mutex::new(None),
            login_token: Mutex::new(live_token()),
            grants: Mutex::new(vec![PermissionGrant {
                routes: vec![CapabilityRoute::new("/backups", ["GET", "POST"])],
            }]),
            permissions_fail: Mutex::new(false),
            reject_create_with: Mutex::new(None),
            created: Mutex::new(Vec::new()),
            login_calls: AtomicUsize::new(0),
            permission_calls: AtomicUsize::new(0),
            login_gate: Semaphore::new(Semaphore::MAX_PERMITS),
            permission_gate: Semaphore::new(Semaphore::MAX_PERMITS),
        }
    }
}

async fn pass(gate: &Semaphore) {
    if let Ok(permit) = gate.acquire().await {
        permit.forget();
    }
}

#[async_trait]
impl AutomationApi for FakeApi {
    fn set_token(&self, token: Option<&str>) {
        *self.token.lock().expect("token lock") = token.map(ToString::to_string);
    }

    async fn login(&self, request: &LoginRequest) -> ApiEnvelope<LoginBody> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        pass(&self.login_gate).await;
        if request.password != PASSWORD {
            return ApiEnvelope::error("Invalid email or password");
        }
        ApiEnvelope::success(LoginBody {
            token: Some(self.login_token.lock().expect("login token lock").clone()),
            user: Some(User {
                email: request.email.clone(),
                ..user("u-1")
            }),
        })
    }

    async fn list_permissions(&self) -> ApiEnvelope<PermissionsBody> {
        self.permission_calls.fetch_add(1, Ordering::SeqCst);
        pass(&self.permission_gate).await;
        if *self.permissions_fail.lock().expect("fail lock") {
            return ApiEnvelope::error("permissions unavailable");
        }
        let grants = self.grants.lock().expect("grants lock").clone();
        ApiEnvelope::success(PermissionsBody {
            permissions: Some(PermissionsPayload::Grants(grants)),
        })
    }

    async fn finance_version(&self) -> ApiEnvelope<VersionBody> {
        ApiEnvelope::success(VersionBody {
            version: Some("1.0.0".to_string()),
        })
    }

    async fn list_job_types(&self) -> ApiEnvelope<JobTypesBody> {
        ApiEnvelope::success(JobTypesBody {
            job_types: Some(vec![restic(), rsync()]),
        })
    }

    async fn list_jobs(&self) -> ApiEnvelope<JobsBody> {
        ApiEnvelope::success(JobsBody { jobs: Some(Vec::new()) })
    }

    async fn create_job(&self, payload: &JobCreatePayload) -> ApiEnvelope<CreateJobBody> {
        self.created
            .lock()
            .expect("created lock")
            .push(payload.clone());
        if let Some(errors) = self.reject_create_with.lock().expect("reject lock").clone() {
            let mut envelope: ApiEnvelope<CreateJobBody> =
                ApiEnvelope::error("Validation failed");
            envelope.body.errors = Some(errors);
            return envelope;
        }
        ApiEnvelope::success(CreateJobBody {
            job: Some(Job {
                id: format!("job-{}", self.created.lock().expect("created lock").len()),
                name: payload.name.clone(),
                identifier: payload.job_type_identifier.clone(),
                configuration: payload.configuration.clone(),
                schedule: payload.schedule.clone(),
                scheduler_id: None,
            }),
            errors: None,
        })
    }

    async fn delete_job(&self, _id: &str) -> ApiEnvelope<EmptyBody> {
        ApiEnvelope::success(EmptyBody {})
    }
}
