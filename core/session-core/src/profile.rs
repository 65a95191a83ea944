//! Profile sync: decides when the member's profile/organization is known.
//!
//! # Fetch lifecycle (per generation)
//!
//! ```text
//! idle ─► loading ─┬─► succeeded
//!                  ├─► retry-scheduled ─► loading (new generation)
//!                  └─► timed-out / errored   (retries exhausted)
//! ```
//!
//! Every attempt captures a generation and re-checks it after each await.
//! A result whose generation was superseded is dropped without a trace
//! beyond a debug log.
//!
//! Failure never regresses what is on screen: a cached or previously
//! confirmed profile stays visible when retries run out.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::{Clock, ProfileBackend};
use crate::bounded::{with_timeout, Bounded};
use crate::config::SyncConfig;
use crate::error::DataError;
use crate::generation::{Generation, GenerationTracker};
use crate::retry::RetryScheduler;
use crate::store::ProfileCache;
use crate::types::{EnvironmentSignal, Organization, OrganizationId, Profile, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Loading,
    RetryScheduled,
    Succeeded,
    TimedOut,
    Errored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSnapshot {
    pub user_id: Option<UserId>,
    pub profile: Option<Profile>,
    pub organization: Option<Organization>,
    /// False while the profile is an optimistic value from the cache.
    pub confirmed: bool,
    pub status: FetchStatus,
    pub error: Option<DataError>,
    /// Attempts made by the current logical fetch, first attempt included.
    pub attempts: u32,
}

impl Default for ProfileSnapshot {
    fn default() -> Self {
        ProfileSnapshot {
            user_id: None,
            profile: None,
            organization: None,
            confirmed: false,
            status: FetchStatus::Idle,
            error: None,
            attempts: 0,
        }
    }
}

impl ProfileSnapshot {
    pub fn is_loading(&self) -> bool {
        matches!(
            self.status,
            FetchStatus::Loading | FetchStatus::RetryScheduled
        )
    }

    pub fn timed_out(&self) -> bool {
        self.status == FetchStatus::TimedOut
    }

    /// Terminal failure that a retry trigger may recover from.
    pub fn needs_recovery(&self) -> bool {
        matches!(self.status, FetchStatus::TimedOut | FetchStatus::Errored)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    Initial,
    Retry,
    Manual,
    Refresh,
}

struct ProfileState {
    snapshot: ProfileSnapshot,
    retry: RetryScheduler,
}

struct ProfileInner {
    backend: Arc<dyn ProfileBackend>,
    cache: ProfileCache,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    generations: GenerationTracker,
    state: Mutex<ProfileState>,
    updates: watch::Sender<ProfileSnapshot>,
}

/// Owns the profile/organization values for the signed-in user.
#[derive(Clone)]
pub struct ProfileSync {
    inner: Arc<ProfileInner>,
}

impl ProfileSync {
    pub fn new(
        backend: Arc<dyn ProfileBackend>,
        cache: ProfileCache,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        let retry = RetryScheduler::new(config.max_retries, config.retry_delays());
        let (updates, _) = watch::channel(ProfileSnapshot::default());
        ProfileSync {
            inner: Arc::new(ProfileInner {
                backend,
                cache,
                clock,
                config,
                generations: GenerationTracker::new(),
                state: Mutex::new(ProfileState {
                    snapshot: ProfileSnapshot::default(),
                    retry,
                }),
                updates,
            }),
        }
    }

    /// Starts a new logical fetch for `user_id`, superseding any in flight.
    pub fn start_fetch(&self, user_id: UserId) -> Generation {
        self.inner.begin(user_id, FetchKind::Initial)
    }

    /// Manual retry with a fresh retry budget. Ignored while loading.
    pub fn retry_now(&self) -> bool {
        let mut state = self.inner.lock();
        if state.snapshot.is_loading() {
            debug!("Retry ignored, profile fetch already in progress");
            return false;
        }
        match state.snapshot.user_id.clone() {
            Some(user_id) => {
                self.inner.begin_locked(&mut state, user_id, FetchKind::Manual);
                true
            }
            None => false,
        }
    }

    /// Re-pulls authoritative data after a write, superseding any fetch in flight.
    pub fn refresh(&self) -> bool {
        let mut state = self.inner.lock();
        match state.snapshot.user_id.clone() {
            Some(user_id) => {
                self.inner.begin_locked(&mut state, user_id, FetchKind::Refresh);
                true
            }
            None => false,
        }
    }

    /// Focus/online trigger: retries only out of a terminal failure.
    pub fn handle_environment(&self, signal: EnvironmentSignal) -> bool {
        let recover = {
            let state = self.inner.lock();
            state.snapshot.needs_recovery() && !state.snapshot.is_loading()
        };
        if !recover {
            return false;
        }
        info!(signal = ?signal, "Environment signal triggered profile retry");
        self.retry_now()
    }

    /// Forgets the current user: in-flight work is superseded, values emptied.
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        self.inner.generations.invalidate();
        state.retry.reset();
        state.snapshot = ProfileSnapshot::default();
        self.inner.publish(&state);
    }

    /// Supersedes in-flight work and cancels retries, keeping current values.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock();
        self.inner.generations.invalidate();
        state.retry.reset();
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        self.inner.lock().snapshot.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProfileSnapshot> {
        self.inner.updates.subscribe()
    }

    pub fn current_generation(&self) -> Generation {
        self.inner.generations.current()
    }
}

impl ProfileInner {
    fn lock(&self) -> MutexGuard<'_, ProfileState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &ProfileState) {
        self.updates.send_replace(state.snapshot.clone());
    }

    fn begin(self: &Arc<Self>, user_id: UserId, kind: FetchKind) -> Generation {
        let mut state = self.lock();
        self.begin_locked(&mut state, user_id, kind)
    }

    /// Generations only advance under the state lock, so a check-then-act
    /// on `is_current` cannot interleave with a newer fetch or a clear.
    fn begin_locked(
        self: &Arc<Self>,
        state: &mut ProfileState,
        user_id: UserId,
        kind: FetchKind,
    ) -> Generation {
        let generation = self.generations.next();
        let snapshot = &mut state.snapshot;

        if snapshot.user_id.as_ref() != Some(&user_id) {
            snapshot.user_id = Some(user_id.clone());
            snapshot.profile = None;
            snapshot.organization = None;
            snapshot.confirmed = false;
        }

        if kind != FetchKind::Retry {
            snapshot.attempts = 0;
            snapshot.error = None;
            if snapshot.profile.is_none() {
                if let Some(cached) = self.cache.read(&user_id) {
                    info!(user_id = %user_id, "Surfacing cached profile while fetching");
                    snapshot.profile = Some(cached.profile);
                    snapshot.organization = cached.organization;
                    snapshot.confirmed = false;
                }
            }
        }

        snapshot.status = FetchStatus::Loading;
        snapshot.attempts += 1;
        debug!(
            user_id = %user_id,
            generation = %generation,
            attempt = snapshot.attempts,
            kind = ?kind,
            "Profile fetch started"
        );

        if kind != FetchKind::Retry {
            state.retry.reset();
        }
        self.publish(state);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.attempt(generation, user_id).await;
        });
        generation
    }

    async fn attempt(self: Arc<Self>, generation: Generation, user_id: UserId) {
        let backend = Arc::clone(&self.backend);
        let fetch_user = user_id.clone();
        let outcome = with_timeout(
            async move { backend.get_profile(&fetch_user).await },
            self.config.user_data_timeout(),
            "profile fetch",
        )
        .await;

        if !self.generations.is_current(generation) {
            debug!(generation = %generation, "Discarding stale profile result");
            return;
        }

        match outcome {
            Bounded::Data(Some(profile)) => self.commit_profile(generation, profile).await,
            Bounded::Data(None) => self.commit_missing(generation, &user_id),
            Bounded::Error(err) => self.fail(generation, user_id, DataError::remote(&err)),
            Bounded::TimedOut => self.fail(generation, user_id, DataError::timeout("profile fetch")),
        }
    }

    async fn commit_profile(self: &Arc<Self>, generation: Generation, profile: Profile) {
        {
            let mut state = self.lock();
            if !self.generations.is_current(generation) {
                debug!(generation = %generation, "Discarding stale profile result");
                return;
            }
            let snapshot = &mut state.snapshot;
            let same_org = snapshot.organization.as_ref().map(|org| &org.id)
                == profile.organization_id.as_ref();
            if !same_org {
                snapshot.organization = None;
            }
            snapshot.profile = Some(profile.clone());
            snapshot.confirmed = true;
            snapshot.status = FetchStatus::Succeeded;
            snapshot.error = None;
            state.retry.reset();
            self.write_cache(&profile, state.snapshot.organization.as_ref());
            self.publish(&state);
        }

        info!(user_id = %profile.id, generation = %generation, "Profile confirmed");

        if let Some(organization_id) = profile.organization_id.clone() {
            self.fetch_organization(generation, profile, organization_id)
                .await;
        }
    }

    fn commit_missing(&self, generation: Generation, user_id: &UserId) {
        {
            let mut state = self.lock();
            if !self.generations.is_current(generation) {
                return;
            }
            let snapshot = &mut state.snapshot;
            snapshot.profile = None;
            snapshot.organization = None;
            snapshot.confirmed = true;
            snapshot.status = FetchStatus::Succeeded;
            snapshot.error = None;
            state.retry.reset();
            if let Err(err) = self.cache.remove(user_id) {
                warn!(error = %err, "Failed to drop profile cache entry");
            }
            self.publish(&state);
        }

        info!(user_id = %user_id, "No profile exists for user");
    }

    /// Organization problems are logged and never touch the fetch status.
    async fn fetch_organization(
        &self,
        generation: Generation,
        profile: Profile,
        organization_id: OrganizationId,
    ) {
        let backend = Arc::clone(&self.backend);
        let fetch_id = organization_id.clone();
        let outcome = with_timeout(
            async move { backend.get_organization(&fetch_id).await },
            self.config.organization_timeout(),
            "organization fetch",
        )
        .await;

        if !self.generations.is_current(generation) {
            debug!(generation = %generation, "Discarding stale organization result");
            return;
        }

        let organization = match outcome {
            Bounded::Data(Some(organization)) => organization,
            Bounded::Data(None) => {
                warn!(organization_id = %organization_id, "Organization not found");
                return;
            }
            Bounded::Error(err) => {
                warn!(organization_id = %organization_id, error = %err, "Organization fetch failed");
                return;
            }
            Bounded::TimedOut => {
                warn!(organization_id = %organization_id, "Organization fetch timed out");
                return;
            }
        };

        let mut state = self.lock();
        if !self.generations.is_current(generation) {
            debug!(generation = %generation, "Discarding stale organization result");
            return;
        }
        self.write_cache(&profile, Some(&organization));
        state.snapshot.organization = Some(organization);
        self.publish(&state);
    }

    fn fail(self: &Arc<Self>, generation: Generation, user_id: UserId, error: DataError) {
        let mut state = self.lock();
        if !self.generations.is_current(generation) {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let retry_user = user_id.clone();
        let scheduled = state.retry.schedule(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut state = inner.lock();
            if inner.generations.is_current(generation) {
                inner.begin_locked(&mut state, retry_user, FetchKind::Retry);
            } else {
                debug!(generation = %generation, "Scheduled retry superseded");
            }
        });

        match scheduled {
            Some(delay) => {
                warn!(
                    user_id = %user_id,
                    error = %error,
                    retry = state.retry.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Profile fetch failed, retry scheduled"
                );
                state.snapshot.status = FetchStatus::RetryScheduled;
            }
            None => {
                warn!(
                    user_id = %user_id,
                    error = %error,
                    attempts = state.snapshot.attempts,
                    "Profile fetch gave up after retries"
                );
                state.snapshot.status = if error.is_timeout() {
                    FetchStatus::TimedOut
                } else {
                    FetchStatus::Errored
                };
                state.snapshot.error = Some(error);
            }
        }
        self.publish(&state);
    }

    /// Callers hold the state lock and have just checked their generation.
    fn write_cache(&self, profile: &Profile, organization: Option<&Organization>) {
        if let Err(err) = self.cache.write(profile, organization, self.clock.now()) {
            warn!(user_id = %profile.id, error = %err, "Failed to write profile cache");
        }
    }
}
