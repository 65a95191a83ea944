//! Collaborator seams: remote backend, wall clock, navigation.
//!
//! Implementors should:
//! - Return `SyncError::Remote` for failures the backend reports
//! - Never block; long calls are bounded by the caller, not here

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{AuthEvent, Organization, OrganizationId, Profile, Session, SignOutScope, UserId};

/// Authentication half of the remote backend.
#[async_trait]
pub trait AuthBackend: Send + Sync + 'static {
    /// Current session, if the backend can restore one.
    async fn get_session(&self) -> Result<Option<Session>>;

    /// Subscribes to auth state changes. The first event is usually
    /// [`AuthEvent::InitialSession`].
    fn subscribe(&self) -> AuthSubscription;

    /// Best-effort sign-out.
    async fn sign_out(&self, scope: SignOutScope) -> Result<()>;
}

/// Row queries for profile data.
#[async_trait]
pub trait ProfileBackend: Send + Sync + 'static {
    async fn get_profile(&self, user_id: &UserId) -> Result<Option<Profile>>;

    async fn get_organization(&self, organization_id: &OrganizationId)
        -> Result<Option<Organization>>;
}

/// Live auth-state subscription. Dropping it disposes the subscription.
#[derive(Debug)]
pub struct AuthSubscription {
    receiver: mpsc::UnboundedReceiver<AuthEvent>,
}

impl AuthSubscription {
    /// Sender/subscription pair for backend implementations.
    pub fn channel() -> (mpsc::UnboundedSender<AuthEvent>, AuthSubscription) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, AuthSubscription { receiver })
    }

    /// Next event, or `None` once the backend closed the stream.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        self.receiver.recv().await
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Full-page navigation, used by the reload recovery path.
pub trait Navigator: Send + Sync {
    fn reload_to(&self, path: &str);
}
