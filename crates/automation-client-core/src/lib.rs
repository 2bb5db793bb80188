//! Client core for the home automation dashboard.
#![cfg_attr(test, expect(clippy::expect_used))]

pub mod api;
pub mod auth;
pub mod backups;
pub mod config;
pub mod context;
pub mod form;
pub mod notification;
pub mod permissions;
pub mod schema;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;

pub use api::{
    ApiClient, ApiClientConfig, ApiClientError, ApiEnvelope, ApiStatus, AutomationApi,
    CreateJobBody, EmptyBody, JobTypesBody, JobsBody, LoginBody, PermissionsBody,
    PermissionsPayload, Service, VersionBody,
};
pub use auth::{AuthInputError, LoginRequest, PersistedSession};
pub use backups::{BackupState, BackupStore, StoreOutcome};
pub use config::{ConfigError, FrontendConfig, ServiceEndpoints};
pub use context::{AppContext, init_tracing};
pub use form::{DynamicFormController, FieldView, InputKind, SubmitHandler, build_payload};
pub use notification::{Notification, NotificationCenter, NotificationLevel, NotifyEvent};
pub use permissions::{
    Access, Capabilities, CapabilityRoute, DashboardSection, DerivationError, FrontendPermission,
    PermissionDomain, PermissionGrant, PermissionSet, derive_permissions, has_permission,
    visible_sections,
};
pub use schema::{FieldErrors, FieldRule, FieldValue, FormSchema, RuleKind, SchemaError, ValidRecord};
pub use session::{SessionPhase, SessionSnapshot, SessionStore};
pub use storage::{FileSessionStorage, MemorySessionStorage, SessionStorage, StorageError};
pub use token::{TokenError, humanize_remaining, is_token_live, token_expiry};
pub use types::{ErrorDetail, FieldDescriptor, FieldType, Job, JobCreatePayload, JobType, User};
