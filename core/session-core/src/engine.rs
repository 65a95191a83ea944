//! SessionCore: the recovery surface the presentation layer consumes.
//!
//! Wires the session lifecycle to profile sync (a new user id starts a
//! fetch, no user clears profile state) and aggregates both into one
//! [`CoreSnapshot`]. Beyond that wiring it adds no sync logic of its own.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use session_core::{Collaborators, SessionCore, SyncConfig};
//!
//! let core = SessionCore::new(collaborators, SyncConfig::default());
//! core.start();
//! let mut updates = core.subscribe();
//! let ready = updates.wait_for(|snapshot| !snapshot.loading).await;
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{AuthBackend, Clock, Navigator, ProfileBackend};
use crate::bounded::{with_timeout, Bounded};
use crate::config::SyncConfig;
use crate::error::DataError;
use crate::profile::{ProfileSnapshot, ProfileSync};
use crate::session::{SessionLifecycle, SessionPhase, SessionSnapshot};
use crate::store::{clear_stored_sessions, KeyValueStore, ProfileCache};
use crate::types::{EnvironmentSignal, Organization, Profile, Session, SignOutScope, UserId};

/// Everything the core talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub auth: Arc<dyn AuthBackend>,
    pub profiles: Arc<dyn ProfileBackend>,
    pub store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
    pub navigator: Arc<dyn Navigator>,
}

/// What the presentation layer renders from.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreSnapshot {
    /// Session determination still in progress.
    pub loading: bool,
    pub session_timed_out: bool,
    pub data_loading: bool,
    pub data_timed_out: bool,
    pub data_error: Option<DataError>,
    pub session: Option<Session>,
    pub profile: Option<Profile>,
    pub organization: Option<Organization>,
    pub profile_confirmed: bool,
}

impl CoreSnapshot {
    fn compose(session: &SessionSnapshot, profile: &ProfileSnapshot) -> Self {
        // Profile state left over from a previous user is never shown.
        let same_user = session.user_id().is_some() && profile.user_id.as_ref() == session.user_id();
        CoreSnapshot {
            loading: session.is_loading(),
            session_timed_out: session.timed_out(),
            data_loading: same_user && profile.is_loading(),
            data_timed_out: same_user && profile.timed_out(),
            data_error: profile.error.clone().filter(|_| same_user),
            session: session.session.clone(),
            profile: profile.profile.clone().filter(|_| same_user),
            organization: profile.organization.clone().filter(|_| same_user),
            profile_confirmed: same_user && profile.confirmed,
        }
    }
}

/// Change stream over both controllers.
pub struct CoreUpdates {
    session: watch::Receiver<SessionSnapshot>,
    profile: watch::Receiver<ProfileSnapshot>,
}

impl CoreUpdates {
    /// Latest composed snapshot; marks both sides as seen.
    pub fn current(&mut self) -> CoreSnapshot {
        let session = self.session.borrow_and_update().clone();
        let profile = self.profile.borrow_and_update().clone();
        CoreSnapshot::compose(&session, &profile)
    }

    /// Waits for either controller to publish. `false` once the core is gone.
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            result = self.session.changed() => result.is_ok(),
            result = self.profile.changed() => result.is_ok(),
        }
    }

    /// Waits until `predicate` holds for the composed snapshot.
    pub async fn wait_for<P>(&mut self, mut predicate: P) -> Option<CoreSnapshot>
    where
        P: FnMut(&CoreSnapshot) -> bool,
    {
        loop {
            let snapshot = self.current();
            if predicate(&snapshot) {
                return Some(snapshot);
            }
            if !self.changed().await {
                return None;
            }
        }
    }
}

pub struct SessionCore {
    lifecycle: SessionLifecycle,
    profiles: ProfileSync,
    auth: Arc<dyn AuthBackend>,
    store: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn Navigator>,
    cache: ProfileCache,
    config: SyncConfig,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionCore {
    pub fn new(collaborators: Collaborators, config: SyncConfig) -> Self {
        let Collaborators {
            auth,
            profiles,
            store,
            clock,
            navigator,
        } = collaborators;

        let cache = ProfileCache::new(Arc::clone(&store), config.profile_cache_prefix.clone());
        let lifecycle = SessionLifecycle::new(
            Arc::clone(&auth),
            Arc::clone(&store),
            Arc::clone(&clock),
            config.clone(),
        );
        let profile_sync = ProfileSync::new(profiles, cache.clone(), clock, config.clone());

        SessionCore {
            lifecycle,
            profiles: profile_sync,
            auth,
            store,
            navigator,
            cache,
            config,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Boots the session lifecycle and starts following its user id.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn start(&self) {
        if self.lifecycle.snapshot().phase != SessionPhase::Uninitialized {
            debug!("Session core already started");
            return;
        }
        self.lifecycle.start();

        let mut sessions = self.lifecycle.subscribe();
        let profiles = self.profiles.clone();
        let watcher = tokio::spawn(async move {
            let mut followed: Option<UserId> = None;
            loop {
                let user_id = sessions.borrow_and_update().user_id().cloned();
                if user_id != followed {
                    match &user_id {
                        Some(user_id) => {
                            info!(user_id = %user_id, "Session user changed, fetching profile");
                            profiles.start_fetch(user_id.clone());
                        }
                        None => {
                            info!("Session ended, clearing profile state");
                            profiles.clear();
                        }
                    }
                    followed = user_id;
                }
                if sessions.changed().await.is_err() {
                    break;
                }
            }
            debug!("Session watcher stopped");
        });
        self.lock_tasks().push(watcher);
    }

    pub fn snapshot(&self) -> CoreSnapshot {
        CoreSnapshot::compose(&self.lifecycle.snapshot(), &self.profiles.snapshot())
    }

    pub fn subscribe(&self) -> CoreUpdates {
        CoreUpdates {
            session: self.lifecycle.subscribe(),
            profile: self.profiles.subscribe(),
        }
    }

    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.lifecycle
    }

    pub fn profiles(&self) -> &ProfileSync {
        &self.profiles
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Recovery operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Manual profile retry. Returns whether a fetch was started.
    pub fn retry_user_data(&self) -> bool {
        self.profiles.retry_now()
    }

    pub fn retry_auth(&self) {
        self.lifecycle.retry();
    }

    /// Re-pulls the profile after a write.
    pub fn refresh_profile(&self) -> bool {
        self.profiles.refresh()
    }

    /// Wipes every persisted entry and reloads to the sign-in page.
    pub fn clear_cache_and_reload(&self) {
        warn!("Clearing all persisted data and reloading");
        self.profiles.clear();
        if let Err(err) = self.store.clear_all() {
            warn!(error = %err, "Failed to clear persisted store");
        }
        self.lifecycle.clear_session();
        self.navigator.reload_to(&self.config.sign_in_path);
    }

    /// Clears local state first, then tells the backend (best effort).
    pub async fn sign_out(&self) {
        let user_id = self.lifecycle.snapshot().user_id().cloned();

        self.profiles.clear();
        let removed = clear_stored_sessions(self.store.as_ref(), &self.config);
        if let Some(user_id) = &user_id {
            if let Err(err) = self.cache.remove(user_id) {
                warn!(user_id = %user_id, error = %err, "Failed to drop profile cache on sign-out");
            }
        }
        self.lifecycle.clear_session();
        info!(removed_sessions = removed, "Local session state cleared");

        let auth = Arc::clone(&self.auth);
        let outcome = with_timeout(
            async move { auth.sign_out(SignOutScope::Local).await },
            self.config.sign_out_timeout(),
            "sign out",
        )
        .await;
        match outcome {
            Bounded::Data(()) => info!("Signed out"),
            Bounded::Error(err) => warn!(error = %err, "Backend sign-out failed"),
            Bounded::TimedOut => warn!("Backend sign-out timed out"),
        }
    }

    /// Focus/online hook. Returns whether a profile retry was started.
    pub fn handle_environment(&self, signal: EnvironmentSignal) -> bool {
        self.profiles.handle_environment(signal)
    }

    /// Feeds environment signals from `signals` until the sender closes.
    pub fn attach_environment(&self, mut signals: mpsc::Receiver<EnvironmentSignal>) {
        let profiles = self.profiles.clone();
        let listener = tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                if !profiles.handle_environment(signal) {
                    debug!(signal = ?signal, "Environment signal ignored");
                }
            }
        });
        self.lock_tasks().push(listener);
    }

    /// Stops every background task. Current values stay readable.
    pub fn shutdown(&self) {
        for task in self.lock_tasks().drain(..) {
            task.abort();
        }
        self.profiles.shutdown();
        self.lifecycle.shutdown();
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SessionCore {
    fn drop(&mut self) {
        self.shutdown();
    }
}
