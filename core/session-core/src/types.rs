//! Shared data types for the session and profile pipeline.
//!
//! Serialized shapes match what the remote backend and the persisted store
//! hold, so unknown fields are ignored and optional fields default.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend-assigned user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Organization (edition) identifier referenced from a profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub String);

impl OrganizationId {
    pub fn new(id: impl Into<String>) -> Self {
        OrganizationId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof of authentication plus its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user_id: UserId,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Session {
    pub fn new(access_token: impl Into<String>, user_id: UserId) -> Self {
        Session {
            access_token: access_token.into(),
            user_id,
            expires_at: None,
            refresh_token: None,
            email: None,
        }
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// A session without an expiry never expires locally; the backend decides.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// The authenticated member's application record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Edition the member belongs to. Drives the secondary organization fetch.
    #[serde(default)]
    pub organization_id: Option<OrganizationId>,
    #[serde(default)]
    pub onboarding_completed: bool,
    #[serde(default)]
    pub profile_completed: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub has_premium_access: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn new(id: UserId) -> Self {
        Profile {
            id,
            display_name: None,
            avatar_url: None,
            organization_id: None,
            onboarding_completed: false,
            profile_completed: false,
            is_admin: false,
            has_premium_access: false,
            updated_at: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }
}

/// Organization/edition record; never required for profile readiness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
}

impl Organization {
    pub fn new(id: OrganizationId, name: impl Into<String>) -> Self {
        Organization {
            id,
            name: name.into(),
            slug: None,
            logo_url: None,
        }
    }
}

/// Push signal from the backend's auth listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// First event after subscribing; carries the restored session, if any.
    InitialSession(Option<Session>),
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
    UserUpdated(Session),
}

impl AuthEvent {
    /// The session this event leaves the client with.
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthEvent::InitialSession(session) => session.as_ref(),
            AuthEvent::SignedIn(session)
            | AuthEvent::TokenRefreshed(session)
            | AuthEvent::UserUpdated(session) => Some(session),
            AuthEvent::SignedOut => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::InitialSession(_) => "INITIAL_SESSION",
            AuthEvent::SignedIn(_) => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::TokenRefreshed(_) => "TOKEN_REFRESHED",
            AuthEvent::UserUpdated(_) => "USER_UPDATED",
        }
    }
}

/// How far a sign-out reaches on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutScope {
    /// Only this client's session.
    Local,
}

/// Environment triggers that may warrant a re-sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentSignal {
    WindowFocus,
    NetworkOnline,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_without_expiry_never_expires() {
        let session = Session::new("token", UserId::new("u1"));
        assert!(!session.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_session_expiry_is_inclusive() {
        let now = Utc::now();
        let session = Session::new("token", UserId::new("u1")).with_expires_at(now);
        assert!(session.is_expired_at(now));
        assert!(!session.is_expired_at(now - Duration::seconds(1)));
    }

    #[test]
    fn test_profile_deserializes_with_missing_flags() {
        let profile: Profile = serde_json::from_str(r#"{"id":"u1","display_name":"Ada"}"#).unwrap();
        assert_eq!(profile.id, UserId::new("u1"));
        assert_eq!(profile.display_name.as_deref(), Some("Ada"));
        assert!(!profile.is_admin);
        assert!(profile.organization_id.is_none());
    }

    #[test]
    fn test_signed_out_event_has_no_session() {
        assert!(AuthEvent::SignedOut.session().is_none());
        let session = Session::new("t", UserId::new("u1"));
        assert_eq!(
            AuthEvent::TokenRefreshed(session.clone()).session(),
            Some(&session)
        );
    }
}
