//! Local-first session hydration.
//!
//! The auth backend persists its session under a key like
//! `sb-<project>-auth-token`. We never assume the exact name: every key with
//! the configured prefix and suffix is a candidate.
//!
//! Anything unreadable (bad JSON, missing token or user id, expired) counts
//! as "no stored session". Nothing here errors.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::KeyValueStore;
use crate::config::SyncConfig;
use crate::types::{Session, UserId};

#[derive(Debug, Deserialize)]
struct StoredUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StoredSessionBlob {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    expires_at: Option<i64>,
    user: StoredUser,
}

fn session_keys<'a>(
    store: &'a dyn KeyValueStore,
    config: &'a SyncConfig,
) -> impl Iterator<Item = String> + 'a {
    store.keys().into_iter().filter(move |key| {
        key.starts_with(&config.session_key_prefix) && key.ends_with(&config.session_key_suffix)
    })
}

fn parse_blob(raw: &str) -> Option<StoredSessionBlob> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let inner = value
        .get("currentSession")
        .or_else(|| value.get("session"))
        .filter(|nested| nested.is_object())
        .cloned()
        .unwrap_or(value);
    serde_json::from_value(inner).ok()
}

fn into_session(blob: StoredSessionBlob) -> Option<Session> {
    if blob.access_token.is_empty() || blob.user.id.is_empty() {
        return None;
    }
    let expires_at = match blob.expires_at {
        Some(secs) => Some(Utc.timestamp_opt(secs, 0).single()?),
        None => None,
    };
    Some(Session {
        access_token: blob.access_token,
        user_id: UserId(blob.user.id),
        expires_at,
        refresh_token: blob.refresh_token,
        email: blob.user.email,
    })
}

/// Returns the stored session with the latest expiry that is still valid at `now`.
pub fn read_stored_session(
    store: &dyn KeyValueStore,
    config: &SyncConfig,
    now: DateTime<Utc>,
) -> Option<Session> {
    let mut best: Option<Session> = None;

    for key in session_keys(store, config) {
        let Some(raw) = store.get(&key) else {
            continue;
        };
        let Some(session) = parse_blob(&raw).and_then(into_session) else {
            tracing::debug!(key = %key, "Ignoring unreadable stored session");
            continue;
        };
        if session.is_expired_at(now) {
            tracing::debug!(key = %key, "Ignoring expired stored session");
            continue;
        }
        // Option ordering puts None first, so expiring blobs outrank open-ended ones.
        match &best {
            Some(current) if current.expires_at >= session.expires_at => {}
            _ => best = Some(session),
        }
    }

    best
}

/// Removes every stored session blob. Returns how many keys were removed.
pub fn clear_stored_sessions(store: &dyn KeyValueStore, config: &SyncConfig) -> usize {
    let mut removed = 0;
    for key in session_keys(store, config).collect::<Vec<_>>() {
        match store.remove(&key) {
            Ok(()) => removed += 1,
            Err(err) => tracing::warn!(key = %key, error = %err, "Failed to remove stored session"),
        }
    }
    removed
}
