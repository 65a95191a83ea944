//! In-process backend with scripted latency and failures for `simulate`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use session_core::{
    AuthBackend, AuthEvent, AuthSubscription, Navigator, Organization, OrganizationId, Profile,
    ProfileBackend, Result, Session, SignOutScope, SyncError, UserId,
};

const DEMO_ORGANIZATION: &str = "edition-demo";

#[derive(Debug, Clone)]
pub struct Script {
    pub user: String,
    pub session_latency: Duration,
    /// When the auth subscription delivers its initial event; `None` never.
    pub event_latency: Option<Duration>,
    pub profile_latency: Duration,
    /// Profile calls that fail before one succeeds.
    pub profile_failures: u32,
    pub organization_fails: bool,
}

pub struct ScriptedBackend {
    script: Script,
    profile_calls: AtomicU32,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Self {
        ScriptedBackend {
            script,
            profile_calls: AtomicU32::new(0),
        }
    }

    fn session(&self) -> Session {
        Session::new(
            format!("scripted-token-{}", self.script.user),
            UserId::new(self.script.user.clone()),
        )
    }
}

#[async_trait]
impl AuthBackend for ScriptedBackend {
    async fn get_session(&self) -> Result<Option<Session>> {
        tokio::time::sleep(self.script.session_latency).await;
        Ok(Some(self.session()))
    }

    fn subscribe(&self) -> AuthSubscription {
        let (sender, subscription) = AuthSubscription::channel();
        if let Some(latency) = self.script.event_latency {
            let session = self.session();
            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                let _ = sender.send(AuthEvent::InitialSession(Some(session)));
                // Keep the stream open, as a real listener would.
                sender.closed().await;
            });
        } else {
            tokio::spawn(async move { sender.closed().await });
        }
        subscription
    }

    async fn sign_out(&self, _scope: SignOutScope) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ProfileBackend for ScriptedBackend {
    async fn get_profile(&self, user_id: &UserId) -> Result<Option<Profile>> {
        tokio::time::sleep(self.script.profile_latency).await;
        let call = self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.script.profile_failures {
            return Err(SyncError::remote(
                "get_profile",
                format!("scripted failure {} of {}", call + 1, self.script.profile_failures),
            ));
        }
        Ok(Some(
            Profile::new(user_id.clone())
                .with_display_name("Demo Member")
                .with_organization(OrganizationId::new(DEMO_ORGANIZATION)),
        ))
    }

    async fn get_organization(&self, organization_id: &OrganizationId) -> Result<Option<Organization>> {
        tokio::time::sleep(self.script.profile_latency / 2).await;
        if self.script.organization_fails {
            return Err(SyncError::remote("get_organization", "scripted failure"));
        }
        Ok(Some(Organization::new(organization_id.clone(), "Demo Edition")))
    }
}

pub struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn reload_to(&self, path: &str) {
        println!("  → reload to {}", path);
    }
}
