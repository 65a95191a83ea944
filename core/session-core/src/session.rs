//! Session lifecycle: decides when "is the visitor signed in?" is known.
//!
//! # The race
//!
//! ```text
//! stored snapshot ──► provisional session (immediately, no network)
//!
//! auth subscription ──┐
//! explicit get_session ├──► first one wins ──► Ready { timed_out }
//! failsafe timer ─────┘
//! ```
//!
//! Each boot (and each [`SessionLifecycle::retry`]) runs under an epoch. A
//! source may only perform the ready transition if its epoch is current and
//! the phase is still `Initializing`, so the transition fires exactly once per
//! epoch no matter how the three sources interleave.
//!
//! Auth events keep flowing after `Ready`: sign-in, sign-out and token
//! refresh update the session without re-firing the transition.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{AuthBackend, Clock};
use crate::bounded::{with_timeout, Bounded};
use crate::config::SyncConfig;
use crate::store::{read_stored_session, KeyValueStore};
use crate::types::{AuthEvent, Session, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    /// Terminal for the current epoch. `timed_out` asks the UI for a recovery view.
    Ready { timed_out: bool },
}

/// Which racing source performed the ready transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadySource {
    AuthEvent,
    SessionFetch,
    Failsafe,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session: Option<Session>,
    /// The session so far only comes from the persisted store.
    pub provisional: bool,
    pub ready_source: Option<ReadySource>,
}

impl SessionSnapshot {
    pub(crate) fn initial() -> Self {
        SessionSnapshot {
            phase: SessionPhase::Uninitialized,
            session: None,
            provisional: false,
            ready_source: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        !matches!(self.phase, SessionPhase::Ready { .. })
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.phase, SessionPhase::Ready { timed_out: true })
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.session.as_ref().map(|session| &session.user_id)
    }
}

struct LifecycleState {
    snapshot: SessionSnapshot,
    epoch: u64,
    ready_transitions: u32,
    listener: Option<JoinHandle<()>>,
    race: Vec<JoinHandle<()>>,
}

impl LifecycleState {
    fn abort_race(&mut self) {
        for handle in self.race.drain(..) {
            handle.abort();
        }
    }

    /// Once ready, the remaining race tasks have nothing left to decide.
    fn settle_race(&mut self) {
        if matches!(self.snapshot.phase, SessionPhase::Ready { .. }) {
            self.abort_race();
        }
    }
}

impl Drop for LifecycleState {
    fn drop(&mut self) {
        self.abort_race();
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

struct LifecycleInner {
    backend: Arc<dyn AuthBackend>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    state: Mutex<LifecycleState>,
    updates: watch::Sender<SessionSnapshot>,
}

/// Owns the session value and the one-time ready transition.
pub struct SessionLifecycle {
    inner: Arc<LifecycleInner>,
}

impl SessionLifecycle {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        let (updates, _) = watch::channel(SessionSnapshot::initial());
        SessionLifecycle {
            inner: Arc::new(LifecycleInner {
                backend,
                store,
                clock,
                config,
                state: Mutex::new(LifecycleState {
                    snapshot: SessionSnapshot::initial(),
                    epoch: 0,
                    ready_transitions: 0,
                    listener: None,
                    race: Vec::new(),
                }),
                updates,
            }),
        }
    }

    /// Hydrates from the store, subscribes, and starts the race.
    ///
    /// Must be called from inside a Tokio runtime. Calling it twice is a no-op.
    pub fn start(&self) {
        let epoch = {
            let mut state = self.inner.lock();
            if state.snapshot.phase != SessionPhase::Uninitialized {
                debug!("Session lifecycle already started");
                return;
            }

            let stored = read_stored_session(
                self.inner.store.as_ref(),
                &self.inner.config,
                self.inner.clock.now(),
            );
            if let Some(session) = &stored {
                info!(user_id = %session.user_id, "Hydrated provisional session from store");
            }
            state.snapshot.provisional = stored.is_some();
            state.snapshot.session = stored;
            state.snapshot.phase = SessionPhase::Initializing;
            state.epoch += 1;
            self.inner.publish(&state);
            state.epoch
        };

        self.inner.subscribe();
        self.inner.begin_race(epoch);
    }

    /// Back to `Initializing` and into a fresh race.
    pub fn retry(&self) {
        let (epoch, needs_listener) = {
            let mut state = self.inner.lock();
            state.abort_race();
            state.epoch += 1;
            state.snapshot.phase = SessionPhase::Initializing;
            state.snapshot.ready_source = None;
            self.inner.publish(&state);
            let needs_listener = state
                .listener
                .as_ref()
                .map(|listener| listener.is_finished())
                .unwrap_or(true);
            (state.epoch, needs_listener)
        };

        info!(epoch, "Retrying session initialization");
        if needs_listener {
            self.inner.subscribe();
        }
        self.inner.begin_race(epoch);
    }

    /// Drops the in-memory session (local sign-out, cache wipe).
    pub fn clear_session(&self) {
        let mut state = self.inner.lock();
        state.snapshot.session = None;
        state.snapshot.provisional = false;
        self.inner.publish(&state);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().snapshot.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.updates.subscribe()
    }

    /// Ready transitions performed since construction, across all epochs.
    pub fn ready_transitions(&self) -> u32 {
        self.inner.lock().ready_transitions
    }

    /// Disposes the auth subscription and every pending timer.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock();
        state.abort_race();
        if let Some(listener) = state.listener.take() {
            listener.abort();
        }
    }
}

impl LifecycleInner {
    fn lock(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &LifecycleState) {
        self.updates.send_replace(state.snapshot.clone());
    }

    fn subscribe(self: &Arc<Self>) {
        let mut subscription = self.backend.subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);
        let listener = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.apply_auth_event(event);
            }
            debug!("Auth subscription closed");
        });

        let mut state = self.lock();
        if let Some(previous) = state.listener.replace(listener) {
            previous.abort();
        }
    }

    fn begin_race(self: &Arc<Self>, epoch: u64) {
        let fetch = {
            let weak = Arc::downgrade(self);
            let backend = Arc::clone(&self.backend);
            let timeout = self.config.session_init_timeout();
            tokio::spawn(async move {
                let outcome =
                    with_timeout(async move { backend.get_session().await }, timeout, "session fetch")
                        .await;
                if let Some(inner) = weak.upgrade() {
                    inner.finish_fetch(epoch, outcome);
                }
            })
        };

        let failsafe = {
            let weak = Arc::downgrade(self);
            let timeout = self.config.failsafe_timeout();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(inner) = weak.upgrade() {
                    let mut state = inner.lock();
                    if inner.transition_ready(&mut state, epoch, true, ReadySource::Failsafe) {
                        warn!(
                            epoch,
                            failsafe_ms = timeout.as_millis() as u64,
                            "Session failsafe fired before any source resolved"
                        );
                        state.settle_race();
                        inner.publish(&state);
                    }
                }
            })
        };

        let mut state = self.lock();
        if state.epoch == epoch {
            state.race.push(fetch);
            state.race.push(failsafe);
        } else {
            fetch.abort();
            failsafe.abort();
        }
    }

    /// The idempotency guard. Only the first caller per epoch wins.
    fn transition_ready(
        &self,
        state: &mut LifecycleState,
        epoch: u64,
        timed_out: bool,
        source: ReadySource,
    ) -> bool {
        if state.epoch != epoch || state.snapshot.phase != SessionPhase::Initializing {
            return false;
        }
        state.snapshot.phase = SessionPhase::Ready { timed_out };
        state.snapshot.ready_source = Some(source);
        state.ready_transitions += 1;
        info!(epoch, timed_out, source = ?source, "Session ready");
        true
    }

    fn finish_fetch(&self, epoch: u64, outcome: Bounded<Option<Session>>) {
        let mut state = self.lock();
        if state.epoch != epoch || state.snapshot.phase != SessionPhase::Initializing {
            debug!(epoch, "Ignoring session fetch that resolved after ready");
            return;
        }

        match outcome {
            Bounded::Data(session) => {
                state.snapshot.session = session;
                state.snapshot.provisional = false;
                self.transition_ready(&mut state, epoch, false, ReadySource::SessionFetch);
            }
            Bounded::Error(err) => {
                warn!(error = %err, "Session fetch failed");
                self.transition_ready(&mut state, epoch, true, ReadySource::SessionFetch);
            }
            Bounded::TimedOut => {
                self.transition_ready(&mut state, epoch, true, ReadySource::SessionFetch);
            }
        }
        state.settle_race();
        self.publish(&state);
    }

    fn apply_auth_event(&self, event: AuthEvent) {
        let mut state = self.lock();
        debug!(event = event.name(), "Auth state changed");

        state.snapshot.session = event.session().cloned();
        state.snapshot.provisional = false;

        let epoch = state.epoch;
        if !self.transition_ready(&mut state, epoch, false, ReadySource::AuthEvent) {
            if state.snapshot.phase == (SessionPhase::Ready { timed_out: true }) {
                info!(event = event.name(), "Live auth signal recovered a timed-out session");
                state.snapshot.phase = SessionPhase::Ready { timed_out: false };
            }
        } else {
            state.settle_race();
        }
        self.publish(&state);
    }
}
