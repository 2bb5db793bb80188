use std::sync::Arc;

use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::api::{ApiClient, ApiClientError, AutomationApi};
use crate::backups::BackupStore;
use crate::config::FrontendConfig;
use crate::notification::NotificationCenter;
use crate::session::SessionStore;
use crate::storage::SessionStorage;

/// Installs a global `fmt` subscriber. `RUST_LOG` wins over `filter`.
/// Returns `false` when a subscriber was already installed.
pub fn init_tracing(filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .try_init()
        .is_ok()
}

/// Everything a dashboard shell needs, wired to one API client and one
/// notification queue.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: FrontendConfig,
    pub api: ApiClient,
    pub notifications: NotificationCenter,
    pub session: SessionStore,
    pub backups: BackupStore,
}

impl AppContext {
    /// Restores any persisted session, which starts a permission refresh
    /// when called inside a tokio runtime.
    pub fn initialize(
        config: FrontendConfig,
        storage: Arc<dyn SessionStorage>,
    ) -> Result<Self, ApiClientError> {
        let api = ApiClient::from_frontend(&config)?;
        let shared: Arc<dyn AutomationApi> = Arc::new(api.clone());
        let notifications = NotificationCenter::new();
        let session = SessionStore::restore(Arc::clone(&shared), storage, notifications.clone());
        let backups = BackupStore::new(shared, notifications.clone());
        debug!(
            authenticated = session.is_authenticated(),
            "application context initialized"
        );
        Ok(Self {
            config,
            api,
            notifications,
            session,
            backups,
        })
    }

    /// Version string reported by the finance service, if reachable.
    pub async fn finance_version(&self) -> Option<String> {
        let envelope = self.api.finance_version().await;
        if envelope.is_success() {
            envelope.body.version
        } else {
            None
        }
    }
}
