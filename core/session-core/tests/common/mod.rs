//! Scriptable fakes shared by the integration tests.
//!
//! Replies are scripted per call and resolve on tokio's clock, so tests run
//! with `start_paused = true` and observe exact millisecond schedules.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use session_core::{
    AuthBackend, AuthEvent, AuthSubscription, Clock, Collaborators, KeyValueStore, MemoryStore,
    Navigator, Organization, OrganizationId, Profile, ProfileBackend, Result, Session,
    SessionCore, SignOutScope, SyncConfig, SyncError, UserId,
};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

pub const SESSION_KEY: &str = "sb-membership-auth-token";

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn session(user: &str) -> Session {
    Session::new(format!("token-{}", user), UserId::new(user))
        .with_expires_at(now() + chrono::Duration::hours(1))
}

pub fn profile(user: &str, name: &str) -> Profile {
    Profile::new(UserId::new(user)).with_display_name(name)
}

pub fn organization(id: &str, name: &str) -> Organization {
    Organization::new(OrganizationId::new(id), name)
}

/// Writes a stored session blob the way the auth client persists it.
pub fn store_session(store: &MemoryStore, user: &str) {
    let blob = serde_json::json!({
        "access_token": format!("stored-{}", user),
        "refresh_token": "refresh",
        "expires_at": (now() + chrono::Duration::hours(1)).timestamp(),
        "user": { "id": user, "email": format!("{}@example.com", user) },
    });
    store.set(SESSION_KEY, &blob.to_string()).unwrap();
}

/// Milliseconds between `start` and each recorded instant.
pub fn offsets_ms(start: Instant, calls: &[Instant]) -> Vec<u64> {
    calls
        .iter()
        .map(|at| at.duration_since(start).as_millis() as u64)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripted replies
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Reply<T> {
    /// The call never settles.
    Never,
    After(Duration, std::result::Result<T, String>),
}

impl<T> Reply<T> {
    pub fn now(value: T) -> Self {
        Reply::After(Duration::ZERO, Ok(value))
    }

    pub fn after(ms: u64, value: T) -> Self {
        Reply::After(Duration::from_millis(ms), Ok(value))
    }

    pub fn fail(message: &str) -> Self {
        Reply::After(Duration::ZERO, Err(message.to_string()))
    }

    pub fn fail_after(ms: u64, message: &str) -> Self {
        Reply::After(Duration::from_millis(ms), Err(message.to_string()))
    }

    async fn resolve(self, operation: &'static str) -> Result<T> {
        match self {
            Reply::Never => std::future::pending().await,
            Reply::After(delay, outcome) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                outcome.map_err(|message| SyncError::remote(operation, message))
            }
        }
    }
}

/// Per-call replies, falling back to a default once the queue is drained.
struct Script<T> {
    queued: VecDeque<Reply<T>>,
    fallback: Reply<T>,
    calls: Vec<Instant>,
}

impl<T: Clone> Script<T> {
    fn new(fallback: Reply<T>) -> Self {
        Script {
            queued: VecDeque::new(),
            fallback,
            calls: Vec::new(),
        }
    }

    fn next(&mut self) -> Reply<T> {
        self.calls.push(Instant::now());
        self.queued
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth backend
// ─────────────────────────────────────────────────────────────────────────────

pub struct FakeAuth {
    session: Mutex<Script<Option<Session>>>,
    sign_out: Mutex<Script<()>>,
    subscribers: Mutex<Vec<UnboundedSender<AuthEvent>>>,
    sign_out_scopes: Mutex<Vec<SignOutScope>>,
}

impl FakeAuth {
    pub fn new() -> Self {
        FakeAuth {
            session: Mutex::new(Script::new(Reply::Never)),
            sign_out: Mutex::new(Script::new(Reply::now(()))),
            subscribers: Mutex::new(Vec::new()),
            sign_out_scopes: Mutex::new(Vec::new()),
        }
    }

    pub fn reply_session(&self, reply: Reply<Option<Session>>) {
        self.session.lock().unwrap().fallback = reply;
    }

    pub fn reply_sign_out(&self, reply: Reply<()>) {
        self.sign_out.lock().unwrap().fallback = reply;
    }

    /// Pushes an auth event to every live subscription.
    pub fn emit(&self, event: AuthEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
    }

    pub fn session_calls(&self) -> usize {
        self.session.lock().unwrap().calls.len()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|sender| !sender.is_closed());
        subscribers.len()
    }

    pub fn sign_out_scopes(&self) -> Vec<SignOutScope> {
        self.sign_out_scopes.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthBackend for FakeAuth {
    async fn get_session(&self) -> Result<Option<Session>> {
        let reply = self.session.lock().unwrap().next();
        reply.resolve("get_session").await
    }

    fn subscribe(&self) -> AuthSubscription {
        let (sender, subscription) = AuthSubscription::channel();
        self.subscribers.lock().unwrap().push(sender);
        subscription
    }

    async fn sign_out(&self, scope: SignOutScope) -> Result<()> {
        self.sign_out_scopes.lock().unwrap().push(scope);
        let reply = self.sign_out.lock().unwrap().next();
        reply.resolve("sign_out").await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Profile backend
// ─────────────────────────────────────────────────────────────────────────────

pub struct FakeProfiles {
    profiles: Mutex<Script<Option<Profile>>>,
    organizations: Mutex<Script<Option<Organization>>>,
}

impl FakeProfiles {
    pub fn new() -> Self {
        FakeProfiles {
            profiles: Mutex::new(Script::new(Reply::Never)),
            organizations: Mutex::new(Script::new(Reply::now(None))),
        }
    }

    pub fn reply_profile(&self, reply: Reply<Option<Profile>>) {
        self.profiles.lock().unwrap().fallback = reply;
    }

    /// Reply for the next profile call only.
    pub fn queue_profile(&self, reply: Reply<Option<Profile>>) {
        self.profiles.lock().unwrap().queued.push_back(reply);
    }

    pub fn reply_organization(&self, reply: Reply<Option<Organization>>) {
        self.organizations.lock().unwrap().fallback = reply;
    }

    pub fn profile_calls(&self) -> Vec<Instant> {
        self.profiles.lock().unwrap().calls.clone()
    }

    pub fn organization_calls(&self) -> usize {
        self.organizations.lock().unwrap().calls.len()
    }
}

#[async_trait]
impl ProfileBackend for FakeProfiles {
    async fn get_profile(&self, _user_id: &UserId) -> Result<Option<Profile>> {
        let reply = self.profiles.lock().unwrap().next();
        reply.resolve("get_profile").await
    }

    async fn get_organization(&self, _organization_id: &OrganizationId) -> Result<Option<Organization>> {
        let reply = self.organizations.lock().unwrap().next();
        reply.resolve("get_organization").await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Clock, navigation, harness
// ─────────────────────────────────────────────────────────────────────────────

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn reload_to(&self, path: &str) {
        self.visits.lock().unwrap().push(path.to_string());
    }
}

pub struct Harness {
    pub auth: Arc<FakeAuth>,
    pub profiles: Arc<FakeProfiles>,
    pub store: Arc<MemoryStore>,
    pub navigator: Arc<RecordingNavigator>,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub fn new() -> Self {
        Harness {
            auth: Arc::new(FakeAuth::new()),
            profiles: Arc::new(FakeProfiles::new()),
            store: Arc::new(MemoryStore::new()),
            navigator: Arc::new(RecordingNavigator::default()),
            clock: Arc::new(FixedClock(now())),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            auth: self.auth.clone(),
            profiles: self.profiles.clone(),
            store: self.store.clone(),
            clock: self.clock.clone(),
            navigator: self.navigator.clone(),
        }
    }

    pub fn core(&self, config: SyncConfig) -> SessionCore {
        SessionCore::new(self.collaborators(), config)
    }
}

/// Lets spawned tasks run without moving the paused clock.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Advances the paused clock by `ms` and lets woken tasks run.
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    settle().await;
}
