//! Last-known-good profile snapshots, one entry per user.
//!
//! Entries have no expiry. A fresh confirmed fetch always overwrites them;
//! they are only ever read to show an optimistic value at fetch start.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::KeyValueStore;
use crate::error::{Result, SyncError};
use crate::types::{Organization, Profile, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedProfile {
    pub user_id: UserId,
    pub profile: Profile,
    #[serde(default)]
    pub organization: Option<Organization>,
    pub cached_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ProfileCache {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl ProfileCache {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        ProfileCache {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn key_for(&self, user_id: &UserId) -> String {
        format!("{}{}", self.prefix, user_id)
    }

    /// Malformed or mismatched entries read as absent.
    pub fn read(&self, user_id: &UserId) -> Option<CachedProfile> {
        let key = self.key_for(user_id);
        let raw = self.store.get(&key)?;
        match serde_json::from_str::<CachedProfile>(&raw) {
            Ok(entry) if entry.user_id == *user_id => Some(entry),
            Ok(_) => {
                tracing::debug!(key = %key, "Profile cache entry belongs to another user");
                None
            }
            Err(err) => {
                tracing::debug!(key = %key, error = %err, "Ignoring malformed profile cache entry");
                None
            }
        }
    }

    pub fn write(
        &self,
        profile: &Profile,
        organization: Option<&Organization>,
        cached_at: DateTime<Utc>,
    ) -> Result<()> {
        let entry = CachedProfile {
            user_id: profile.id.clone(),
            profile: profile.clone(),
            organization: organization.cloned(),
            cached_at,
        };
        let raw = serde_json::to_string(&entry).map_err(|source| SyncError::Json {
            context: "serializing profile cache entry".to_string(),
            source,
        })?;
        self.store.set(&self.key_for(&profile.id), &raw)
    }

    pub fn remove(&self, user_id: &UserId) -> Result<()> {
        self.store.remove(&self.key_for(user_id))
    }

    /// All readable entries, for diagnostics.
    pub fn entries(&self) -> Vec<CachedProfile> {
        self.store
            .keys()
            .into_iter()
            .filter_map(|key| {
                let user = key.strip_prefix(&self.prefix)?;
                self.read(&UserId::new(user))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::OrganizationId;

    fn cache() -> (Arc<MemoryStore>, ProfileCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = ProfileCache::new(store.clone(), "cache:");
        (store, cache)
    }

    #[test]
    fn test_write_then_read_returns_full_profile() {
        let (_, cache) = cache();
        let org = Organization::new(OrganizationId::new("org-1"), "Spring Edition");
        let profile = Profile::new(UserId::new("u1"))
            .with_display_name("Ada")
            .with_organization(org.id.clone());
        let now = Utc::now();

        cache.write(&profile, Some(&org), now).unwrap();

        let entry = cache.read(&UserId::new("u1")).unwrap();
        assert_eq!(entry.profile, profile);
        assert_eq!(entry.organization, Some(org));
        assert_eq!(entry.cached_at, now);
    }

    #[test]
    fn test_malformed_entry_reads_as_absent() {
        let (store, cache) = cache();
        store.set("cache:u1", "not json").unwrap();
        assert!(cache.read(&UserId::new("u1")).is_none());
    }

    #[test]
    fn test_entry_for_other_user_reads_as_absent() {
        let (store, cache) = cache();
        let profile = Profile::new(UserId::new("u2"));
        cache.write(&profile, None, Utc::now()).unwrap();
        let raw = store.get("cache:u2").unwrap();
        store.set("cache:u1", &raw).unwrap();

        assert!(cache.read(&UserId::new("u1")).is_none());
    }

    #[test]
    fn test_remove_and_entries() {
        let (_, cache) = cache();
        cache
            .write(&Profile::new(UserId::new("a")), None, Utc::now())
            .unwrap();
        cache
            .write(&Profile::new(UserId::new("b")), None, Utc::now())
            .unwrap();
        assert_eq!(cache.entries().len(), 2);

        cache.remove(&UserId::new("a")).unwrap();
        let remaining: Vec<_> = cache.entries().into_iter().map(|e| e.user_id).collect();
        assert_eq!(remaining, vec![UserId::new("b")]);
    }
}
