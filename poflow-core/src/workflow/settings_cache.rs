//! TTL cache over per-company workflow settings

use crate::models::approval::ApprovalWorkflowSettings;
use crate::store::OrderStore;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    fetched_at: Instant,
    settings: Option<ApprovalWorkflowSettings>,
}

/// Read-through cache for `active_settings`, keyed by company. Entries expire
/// after the configured TTL; negative lookups are cached too so a company with
/// no settings does not hit the store on every routing call.
pub struct SettingsCache {
    ttl: Duration,
    entries: DashMap<i64, CacheEntry>,
}

impl SettingsCache {
    /// Create a cache with the given entry lifetime
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Settings for a company, served from cache while fresh
    pub fn get(&self, company_id: i64, store: &OrderStore) -> Option<ApprovalWorkflowSettings> {
        if let Some(entry) = self.entries.get(&company_id) {
            if entry.fetched_at.elapsed() < self.ttl {
                return entry.settings.clone();
            }
        }

        let settings = store.active_settings(company_id);
        self.entries.insert(
            company_id,
            CacheEntry {
                fetched_at: Instant::now(),
                settings: settings.clone(),
            },
        );
        settings
    }

    /// Drop the cached entry for one company (e.g. after a settings update)
    pub fn invalidate(&self, company_id: i64) {
        self.entries.remove(&company_id);
    }

    /// Drop every cached entry
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::approval::ApprovalMode;
    use chrono::Utc;
    use tempfile::tempdir;

    fn settings(company_id: i64, mode: ApprovalMode) -> ApprovalWorkflowSettings {
        ApprovalWorkflowSettings {
            company_id,
            approval_mode: mode,
            direct_approval_roles: vec![],
            staged_approval_thresholds: vec![],
            require_all_stages: false,
            skip_lower_stages: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_fresh_entry_hides_store_updates() {
        let dir = tempdir().unwrap();
        let store = OrderStore::new(dir.path().join("orders.json")).unwrap();
        let cache = SettingsCache::new(Duration::from_secs(300));

        store.insert_settings(settings(1, ApprovalMode::Direct)).unwrap();
        assert_eq!(
            cache.get(1, &store).unwrap().approval_mode,
            ApprovalMode::Direct
        );

        // Newer row is invisible until the entry expires or is invalidated
        store.insert_settings(settings(1, ApprovalMode::Staged)).unwrap();
        assert_eq!(
            cache.get(1, &store).unwrap().approval_mode,
            ApprovalMode::Direct
        );

        cache.invalidate(1);
        assert_eq!(
            cache.get(1, &store).unwrap().approval_mode,
            ApprovalMode::Staged
        );
    }

    #[test]
    fn test_zero_ttl_always_rereads() {
        let dir = tempdir().unwrap();
        let store = OrderStore::new(dir.path().join("orders.json")).unwrap();
        let cache = SettingsCache::new(Duration::ZERO);

        assert!(cache.get(1, &store).is_none());

        store.insert_settings(settings(1, ApprovalMode::Staged)).unwrap();
        assert!(cache.get(1, &store).is_some());
    }

    #[test]
    fn test_negative_lookup_is_cached() {
        let dir = tempdir().unwrap();
        let store = OrderStore::new(dir.path().join("orders.json")).unwrap();
        let cache = SettingsCache::new(Duration::from_secs(300));

        assert!(cache.get(2, &store).is_none());

        // The store now has settings, but the cached miss still holds
        store.insert_settings(settings(2, ApprovalMode::Direct)).unwrap();
        assert!(cache.get(2, &store).is_none());

        cache.clear();
        assert!(cache.get(2, &store).is_some());
    }
}
