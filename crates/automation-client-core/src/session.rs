//! Authentication lifecycle: login, logout, restore, and permission refresh.
//!
//! The state lives behind a mutex that is never held across an `.await`.
//! Every mutation swaps in a new [`SessionSnapshot`]. A generation counter
//! tags background permission refreshes so that a refresh started for an
//! earlier session cannot write into a later one.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{AutomationApi, PermissionsPayload};
use crate::auth::{LoginRequest, PersistedSession};
use crate::notification::{NotificationCenter, NotifyEvent};
use crate::permissions::{Capabilities, FrontendPermission, PermissionSet, derive_permissions};
use crate::storage::SessionStorage;
use crate::token::{humanize_remaining, is_token_live, token_expiry};
use crate::types::User;

pub const LOGIN_ERROR_TITLE: &str = "Login Error";
pub const PERMISSION_ERROR_TITLE: &str = "Permission Error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Anonymous,
    Authenticating,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub user: Option<User>,
    pub token: Option<String>,
    pub permissions: PermissionSet,
}

impl SessionSnapshot {
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            phase: SessionPhase::Anonymous,
            user: None,
            token: None,
            permissions: PermissionSet::empty(),
        }
    }

    fn authenticated(session: PersistedSession) -> Self {
        Self {
            phase: SessionPhase::Authenticated,
            user: Some(session.user),
            token: Some(session.token),
            permissions: PermissionSet::empty(),
        }
    }

    fn authenticating() -> Self {
        Self {
            phase: SessionPhase::Authenticating,
            ..Self::anonymous()
        }
    }
}

struct SessionState {
    snapshot: Arc<SessionSnapshot>,
    generation: u64,
}

struct SessionInner {
    api: Arc<dyn AutomationApi>,
    storage: Arc<dyn SessionStorage>,
    notifications: NotificationCenter,
    state: Mutex<SessionState>,
}

/// Shared handle to the session. Clones observe the same state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("snapshot", &self.snapshot())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(
        api: Arc<dyn AutomationApi>,
        storage: Arc<dyn SessionStorage>,
        notifications: NotificationCenter,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                api,
                storage,
                notifications,
                state: Mutex::new(SessionState {
                    snapshot: Arc::new(SessionSnapshot::anonymous()),
                    generation: 0,
                }),
            }),
        }
    }

    /// Builds the store from whatever the storage holds. Only a complete
    /// record with a live token authenticates; storage is never erased here.
    pub fn restore(
        api: Arc<dyn AutomationApi>,
        storage: Arc<dyn SessionStorage>,
        notifications: NotificationCenter,
    ) -> Self {
        Self::restore_at(api, storage, notifications, Utc::now())
    }

    pub fn restore_at(
        api: Arc<dyn AutomationApi>,
        storage: Arc<dyn SessionStorage>,
        notifications: NotificationCenter,
        now: DateTime<Utc>,
    ) -> Self {
        let persisted = match storage.load_session() {
            Ok(persisted) => persisted,
            Err(error) => {
                warn!(error = %error, "ignoring unreadable persisted session");
                None
            }
        };
        let store = Self::new(api, storage, notifications);
        let Some(session) = persisted.filter(PersistedSession::is_complete) else {
            debug!("no persisted session to restore");
            return store;
        };
        let expiry = match token_expiry(&session.token) {
            Ok(expiry) if expiry > now => expiry,
            Ok(_) => {
                debug!(user_id = %session.user.id, "persisted session expired");
                return store;
            }
            Err(error) => {
                warn!(error = %error, "persisted session token is unreadable");
                return store;
            }
        };

        debug!(
            user_id = %session.user.id,
            remaining = %humanize_remaining(expiry - now),
            "restored persisted session"
        );
        store.inner.api.set_token(Some(&session.token));
        store.replace(|state| {
            state.snapshot = Arc::new(SessionSnapshot::authenticated(session));
        });
        store.start_permission_refresh();
        store
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        Arc::clone(&self.lock().snapshot)
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.snapshot().user.clone()
    }

    #[must_use]
    pub fn has_permission(&self, permission: FrontendPermission) -> bool {
        self.snapshot().permissions.contains(permission)
    }

    #[must_use]
    pub fn notifications(&self) -> &NotificationCenter {
        &self.inner.notifications
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated_at(Utc::now())
    }

    /// An expired token demotes the in-memory session to anonymous. The
    /// stored record stays where it is.
    pub fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.lock();
        if state.snapshot.phase != SessionPhase::Authenticated {
            return false;
        }
        let live = state
            .snapshot
            .token
            .as_deref()
            .is_some_and(|token| is_token_live(token, now));
        if live {
            return true;
        }
        state.generation += 1;
        state.snapshot = Arc::new(SessionSnapshot::anonymous());
        drop(state);

        debug!("session token expired");
        self.inner.api.set_token(None);
        false
    }

    /// Resolves `true` once the session is persisted and the token has been
    /// handed to the API client. Permissions load in the background.
    pub async fn login(&self, email: &str, password: &str) -> bool {
        let request = match LoginRequest::new(email, password) {
            Ok(request) => request,
            Err(error) => {
                self.inner
                    .notifications
                    .notify(NotifyEvent::error(LOGIN_ERROR_TITLE, error.to_string()));
                return false;
            }
        };

        let (generation, previous) = {
            let mut state = self.lock();
            state.generation += 1;
            let previous = std::mem::replace(
                &mut state.snapshot,
                Arc::new(SessionSnapshot::authenticating()),
            );
            (state.generation, previous)
        };
        debug!(email = %request.email, "login started");

        let envelope = self.inner.api.login(&request).await;
        let outcome = match (envelope.is_success(), envelope.body.token, envelope.body.user) {
            (true, Some(token), Some(user)) if !token.trim().is_empty() => {
                Ok(PersistedSession { user, token })
            }
            (true, _, _) => Err("login response is missing the user or token".to_string()),
            (false, _, _) if envelope.message.trim().is_empty() => {
                Err("login failed".to_string())
            }
            (false, _, _) => Err(envelope.message),
        };

        let session = match outcome {
            Ok(session) => session,
            Err(message) => {
                // A rejected re-login leaves the signed-in session untouched.
                let fallback = if previous.phase == SessionPhase::Authenticated {
                    previous
                } else {
                    Arc::new(SessionSnapshot::anonymous())
                };
                self.commit_if_current(generation, |state| state.snapshot = fallback);
                self.inner
                    .notifications
                    .notify(NotifyEvent::error(LOGIN_ERROR_TITLE, message));
                return false;
            }
        };

        let user_id = session.user.id.clone();
        // Storage and the transport are written under the state lock so a
        // logout cannot interleave with them.
        let committed = self.commit_if_current(generation, |state| {
            if let Err(error) = self.inner.storage.persist_session(&session) {
                warn!(error = %error, "failed to persist session");
            }
            self.inner.api.set_token(Some(&session.token));
            state.snapshot = Arc::new(SessionSnapshot::authenticated(session));
        });
        if !committed {
            debug!("login superseded before it completed");
            return false;
        }

        debug!(user_id = %user_id, "login succeeded");
        self.start_permission_refresh();
        true
    }

    /// Clears memory and storage. Calling it while anonymous is harmless.
    pub fn logout(&self) {
        self.replace(|state| {
            state.snapshot = Arc::new(SessionSnapshot::anonymous());
            self.inner.api.set_token(None);
            if let Err(error) = self.inner.storage.clear_session() {
                warn!(error = %error, "failed to erase persisted session");
            }
        });
        debug!("logged out");
    }

    /// Fetches capabilities and replaces the permission set. On failure the
    /// previous permissions are kept and a notification is raised.
    pub async fn refresh_permissions(&self) -> bool {
        let generation = {
            let state = self.lock();
            if state.snapshot.phase != SessionPhase::Authenticated {
                return false;
            }
            state.generation
        };

        let envelope = self.inner.api.list_permissions().await;
        if !envelope.is_success() {
            if self.generation() == generation {
                self.inner.notifications.notify(NotifyEvent::error(
                    PERMISSION_ERROR_TITLE,
                    envelope.message,
                ));
            }
            return false;
        }

        let capabilities = envelope
            .body
            .permissions
            .map_or(Capabilities::Grants(Vec::new()), PermissionsPayload::into_capabilities);
        let permissions = derive_permissions(&capabilities);
        let count = permissions.len();
        let committed = self.commit_if_current(generation, |state| {
            let mut snapshot = SessionSnapshot::clone(&state.snapshot);
            snapshot.permissions = permissions;
            state.snapshot = Arc::new(snapshot);
        });
        if committed {
            debug!(count, "permissions refreshed");
        } else {
            debug!("discarding stale permission refresh");
        }
        committed
    }

    /// Starts [`Self::refresh_permissions`] on the current runtime. Returns
    /// `None` when called outside one.
    pub fn spawn_permission_refresh(&self) -> Option<JoinHandle<bool>> {
        let Ok(handle) = Handle::try_current() else {
            warn!("no async runtime, permission refresh skipped");
            return None;
        };
        let store = self.clone();
        Some(handle.spawn(async move { store.refresh_permissions().await }))
    }

    // Detached; the generation check drops its result if the session moves on.
    fn start_permission_refresh(&self) {
        drop(self.spawn_permission_refresh());
    }

    fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Applies `update` under a fresh generation and returns it.
    fn replace(&self, update: impl FnOnce(&mut SessionState)) -> u64 {
        let mut state = self.lock();
        state.generation += 1;
        update(&mut state);
        state.generation
    }

    fn commit_if_current(&self, generation: u64, update: impl FnOnce(&mut SessionState)) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        update(&mut state);
        true
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
