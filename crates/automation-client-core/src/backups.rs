//! Backup job list, job type catalog, and the create/delete dialog state.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::api::AutomationApi;
use crate::notification::{NotificationCenter, NotifyEvent};
use crate::schema::FIELD_JOB_TYPE_IDENTIFIER;
use crate::types::{ErrorDetail, Job, JobCreatePayload, JobType};

pub const FETCH_JOBS_ERROR_TITLE: &str = "Could not fetch backup jobs";
pub const FETCH_JOB_TYPES_ERROR_TITLE: &str = "Could not fetch backup job types";
pub const CREATE_JOB_ERROR_TITLE: &str = "Could not create backup job";
pub const DELETE_JOB_ERROR_TITLE: &str = "Could not delete backup job";
pub const CREATE_JOB_SUCCESS_TITLE: &str = "Created backup job";
pub const DELETE_JOB_SUCCESS_TITLE: &str = "Backup job deleted";
pub const UNKNOWN_JOB_TYPE_MESSAGE: &str = "Unknown job type";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackupState {
    pub jobs: Vec<Job>,
    pub job_types: Vec<JobType>,
    pub pending_delete_id: Option<String>,
    pub create_dialog_open: bool,
}

impl BackupState {
    #[must_use]
    pub fn delete_dialog_open(&self) -> bool {
        self.pending_delete_id.is_some()
    }

    #[must_use]
    pub fn job_type(&self, identifier: &str) -> Option<&JobType> {
        self.job_types
            .iter()
            .find(|job_type| job_type.identifier == identifier)
    }
}

/// What a store action reports back to the view, besides the notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOutcome {
    pub success: bool,
    pub message: String,
    pub errors: Vec<ErrorDetail>,
}

impl StoreOutcome {
    fn success(message: String) -> Self {
        Self {
            success: true,
            message,
            errors: Vec::new(),
        }
    }

    fn failure(message: String, errors: Vec<ErrorDetail>) -> Self {
        Self {
            success: false,
            message,
            errors,
        }
    }
}

#[derive(Clone)]
pub struct BackupStore {
    api: Arc<dyn AutomationApi>,
    notifications: NotificationCenter,
    state: Arc<Mutex<Arc<BackupState>>>,
}

impl fmt::Debug for BackupStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupStore")
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl BackupStore {
    pub fn new(api: Arc<dyn AutomationApi>, notifications: NotificationCenter) -> Self {
        Self {
            api,
            notifications,
            state: Arc::new(Mutex::new(Arc::new(BackupState::default()))),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<BackupState> {
        Arc::clone(&self.lock())
    }

    pub async fn fetch_jobs(&self) -> StoreOutcome {
        let envelope = self.api.list_jobs().await;
        if !envelope.is_success() {
            return self.fail(FETCH_JOBS_ERROR_TITLE, envelope.message, Vec::new());
        }
        let jobs = envelope.body.jobs.unwrap_or_default();
        debug!(count = jobs.len(), "backup jobs fetched");
        self.update(|state| state.jobs = jobs);
        StoreOutcome::success(envelope.message)
    }

    pub async fn fetch_job_types(&self) -> StoreOutcome {
        let envelope = self.api.list_job_types().await;
        if !envelope.is_success() {
            return self.fail(FETCH_JOB_TYPES_ERROR_TITLE, envelope.message, Vec::new());
        }
        let job_types = envelope.body.job_types.unwrap_or_default();
        debug!(count = job_types.len(), "backup job types fetched");
        self.update(|state| state.job_types = job_types);
        StoreOutcome::success(envelope.message)
    }

    /// Payloads naming a job type this store has not loaded are rejected
    /// without contacting the backend.
    pub async fn create_job(&self, payload: JobCreatePayload) -> StoreOutcome {
        if self.snapshot().job_type(&payload.job_type_identifier).is_none() {
            return self.fail(
                CREATE_JOB_ERROR_TITLE,
                format!("{UNKNOWN_JOB_TYPE_MESSAGE}: {}", payload.job_type_identifier),
                vec![ErrorDetail::new(
                    FIELD_JOB_TYPE_IDENTIFIER,
                    UNKNOWN_JOB_TYPE_MESSAGE,
                )],
            );
        }

        let envelope = self.api.create_job(&payload).await;
        if !envelope.is_success() {
            let errors = envelope.body.errors.unwrap_or_default();
            return self.fail(CREATE_JOB_ERROR_TITLE, envelope.message, errors);
        }

        let created = envelope.body.job;
        if created.is_none() {
            warn!(name = %payload.name, "create response carried no job");
        }
        self.update(|state| {
            state.create_dialog_open = false;
            state.jobs.extend(created);
        });
        let message = non_empty_or(envelope.message, &payload.name);
        self.notifications
            .notify(NotifyEvent::success(CREATE_JOB_SUCCESS_TITLE, message.clone()));
        StoreOutcome::success(message)
    }

    pub async fn delete_job(&self, id: &str) -> StoreOutcome {
        let envelope = self.api.delete_job(id).await;
        if !envelope.is_success() {
            return self.fail(DELETE_JOB_ERROR_TITLE, envelope.message, Vec::new());
        }
        self.update(|state| {
            state.jobs.retain(|job| job.id != id);
            state.pending_delete_id = None;
        });
        let message = non_empty_or(envelope.message, id);
        self.notifications
            .notify(NotifyEvent::success(DELETE_JOB_SUCCESS_TITLE, message.clone()));
        StoreOutcome::success(message)
    }

    /// Opens the delete confirmation for `id`.
    pub fn request_delete(&self, id: impl Into<String>) {
        let id = id.into();
        self.update(|state| state.pending_delete_id = Some(id));
    }

    pub fn cancel_delete(&self) {
        self.update(|state| state.pending_delete_id = None);
    }

    pub fn set_create_dialog_open(&self, open: bool) {
        self.update(|state| state.create_dialog_open = open);
    }

    fn fail(&self, title: &str, message: String, errors: Vec<ErrorDetail>) -> StoreOutcome {
        warn!(title, message = %message, "backup store action failed");
        self.notifications
            .notify(NotifyEvent::error(title, message.clone()));
        StoreOutcome::failure(message, errors)
    }

    fn update(&self, mutate: impl FnOnce(&mut BackupState)) {
        let mut state = self.lock();
        let mut next = BackupState::clone(&state);
        mutate(&mut next);
        *state = Arc::new(next);
    }

    fn lock(&self) -> MutexGuard<'_, Arc<BackupState>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn non_empty_or(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}
