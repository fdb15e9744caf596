//! Mapping store.
//!
//! Persists finished [`MappingRecord`]s with an expiry, a title pointer for
//! search, and a membership set for enumeration:
//!
//! ```text
//! indication:mapping:<setid>                 -> MappingRecord JSON   (72h)
//! indication:mapping:search:<lower title>    -> setid                (72h)
//! indication:index                           -> {setid, ...}         (no expiry)
//! ```
//!
//! Pointers and membership may outlive the record they name. Readers treat a
//! dangling entry as a miss. Store failures never escape: they are logged and
//! reported as `None`, `false` or an empty set.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::models::MappingRecord;
use crate::store::{BatchOp, KvStore};

pub const MAPPING_KEY_PREFIX: &str = "indication:mapping:";
pub const TITLE_KEY_PREFIX: &str = "indication:mapping:search:";
pub const INDEX_KEY: &str = "indication:index";

/// Lifetime of records and title pointers.
pub const DEFAULT_MAPPING_TTL: Duration = Duration::from_secs(60 * 60 * 72);

/// Keys examined per scan call in the title fallback.
const SCAN_PAGE_SIZE: usize = 100;

pub fn mapping_key(identifier: &str) -> String {
    format!("{MAPPING_KEY_PREFIX}{identifier}")
}

pub fn title_key(title: &str) -> String {
    format!("{TITLE_KEY_PREFIX}{}", title.to_lowercase())
}

/// Expiring persistence of mapping results.
#[derive(Clone)]
pub struct MappingStore {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl MappingStore {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Build and persist a record. Returns whether the write landed.
    pub async fn save(
        &self,
        identifier: &str,
        title: &str,
        contexts: Vec<String>,
        derived_data: Option<serde_json::Value>,
    ) -> bool {
        let record = MappingRecord::new(identifier, title, contexts, derived_data);
        self.save_record(&record).await
    }

    /// Persist a record, its title pointer and its membership in one batch.
    pub async fn save_record(&self, record: &MappingRecord) -> bool {
        let payload = match serde_json::to_string(record) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(setid = %record.identifier, error = %e, "mapping record not serializable");
                return false;
            }
        };

        let ops = vec![
            BatchOp::SetEx {
                key: mapping_key(&record.identifier),
                value: payload,
                ttl: self.ttl,
            },
            BatchOp::SetEx {
                key: title_key(&record.title),
                value: record.identifier.clone(),
                ttl: self.ttl,
            },
            BatchOp::SetAdd {
                set: INDEX_KEY.to_string(),
                member: record.identifier.clone(),
            },
        ];

        match self.store.exec_batch(ops).await {
            Ok(()) => {
                debug!(setid = %record.identifier, "mapping saved");
                true
            }
            Err(e) => {
                warn!(setid = %record.identifier, error = %e, "mapping save failed");
                false
            }
        }
    }

    pub async fn get_by_id(&self, identifier: &str) -> Option<MappingRecord> {
        let key = mapping_key(identifier);
        let payload = match self.store.get(&key).await {
            Ok(payload) => payload?,
            Err(e) => {
                warn!(setid = identifier, error = %e, "mapping read failed");
                return None;
            }
        };

        match serde_json::from_str(&payload) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(setid = identifier, error = %e, "stored mapping is corrupt");
                None
            }
        }
    }

    /// Resolve a title to the identifier of a live record.
    ///
    /// Tries the exact lower-cased pointer first, then scans pointers whose
    /// key contains the title as a literal substring. Pointers to expired
    /// records are skipped.
    pub async fn find_identifier_by_title(&self, title: &str) -> Option<String> {
        let needle = title.to_lowercase();
        if needle.trim().is_empty() {
            return None;
        }

        if let Some(identifier) = self.live_target(&title_key(&needle)).await {
            return Some(identifier);
        }

        let pattern = format!("{TITLE_KEY_PREFIX}*{}*", globset::escape(&needle));
        let mut cursor = 0;
        loop {
            let page = match self.store.scan(cursor, &pattern, SCAN_PAGE_SIZE).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(title, error = %e, "title scan failed");
                    return None;
                }
            };

            for key in &page.keys {
                if let Some(identifier) = self.live_target(key).await {
                    debug!(title, %key, setid = %identifier, "title matched by scan");
                    return Some(identifier);
                }
            }

            if page.cursor == 0 {
                return None;
            }
            cursor = page.cursor;
        }
    }

    /// Every identifier ever saved and not yet deleted or pruned.
    ///
    /// Some may name records that have since expired.
    pub async fn list_all_identifiers(&self) -> BTreeSet<String> {
        match self.store.set_members(INDEX_KEY).await {
            Ok(members) => members,
            Err(e) => {
                warn!(error = %e, "mapping index read failed");
                BTreeSet::new()
            }
        }
    }

    /// Remove a record with its pointer and membership.
    ///
    /// Returns `false` without side effects when no live record exists.
    pub async fn delete(&self, identifier: &str) -> bool {
        let Some(record) = self.get_by_id(identifier).await else {
            return false;
        };

        let pointer = title_key(&record.title);
        let mut ops = vec![
            BatchOp::Delete {
                key: mapping_key(identifier),
            },
            BatchOp::SetRemove {
                set: INDEX_KEY.to_string(),
                member: identifier.to_string(),
            },
        ];
        // Another record with the same title may own the pointer now.
        if let Ok(Some(target)) = self.store.get(&pointer).await {
            if target == identifier {
                ops.push(BatchOp::Delete { key: pointer });
            }
        }

        match self.store.exec_batch(ops).await {
            Ok(()) => {
                info!(setid = identifier, "mapping deleted");
                true
            }
            Err(e) => {
                warn!(setid = identifier, error = %e, "mapping delete failed");
                false
            }
        }
    }

    /// Drop index members whose record no longer exists. Returns how many
    /// were pruned.
    pub async fn reconcile_index(&self) -> usize {
        let mut dangling = Vec::new();
        for identifier in self.list_all_identifiers().await {
            match self.store.get(&mapping_key(&identifier)).await {
                Ok(None) => dangling.push(identifier),
                Ok(Some(_)) => {}
                Err(e) => {
                    warn!(setid = %identifier, error = %e, "reconcile skipped member");
                }
            }
        }

        if dangling.is_empty() {
            return 0;
        }

        let ops = dangling
            .iter()
            .map(|identifier| BatchOp::SetRemove {
                set: INDEX_KEY.to_string(),
                member: identifier.clone(),
            })
            .collect();

        match self.store.exec_batch(ops).await {
            Ok(()) => {
                info!(pruned = dangling.len(), "mapping index reconciled");
                dangling.len()
            }
            Err(e) => {
                warn!(error = %e, "mapping index reconcile failed");
                0
            }
        }
    }

    /// Follow a pointer key to an identifier whose record is still present.
    async fn live_target(&self, pointer: &str) -> Option<String> {
        let identifier = match self.store.get(pointer).await {
            Ok(identifier) => identifier?,
            Err(e) => {
                warn!(key = pointer, error = %e, "title pointer read failed");
                return None;
            }
        };

        match self.store.get(&mapping_key(&identifier)).await {
            Ok(Some(_)) => Some(identifier),
            Ok(None) => {
                debug!(key = pointer, setid = %identifier, "stale title pointer");
                None
            }
            Err(e) => {
                warn!(setid = %identifier, error = %e, "mapping read failed");
                None
            }
        }
    }
}
