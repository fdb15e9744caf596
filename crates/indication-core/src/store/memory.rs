//! In-process key-value store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{key_matcher, BatchOp, KvStore, ScanPage, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Text,
    Set,
    Missing,
}

/// Expiring in-memory store.
///
/// Dead entries are ignored on read and replaced on write; only
/// [`KvStore::purge_expired`] frees them. Time comes from `tokio::time`, so
/// paused-clock tests can advance past a TTL.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn kind_of(entries: &BTreeMap<String, Entry>, key: &str, now: Instant) -> Kind {
    match entries.get(key) {
        Some(entry) if entry.is_live(now) => match entry.value {
            Value::Text(_) => Kind::Text,
            Value::Set(_) => Kind::Set,
        },
        _ => Kind::Missing,
    }
}

/// Check a batch against the current state without touching it.
fn validate(entries: &BTreeMap<String, Entry>, ops: &[BatchOp], now: Instant) -> StoreResult<()> {
    let mut overlay: HashMap<&str, Kind> = HashMap::new();
    for op in ops {
        match op {
            BatchOp::SetEx { key, .. } => {
                overlay.insert(key.as_str(), Kind::Text);
            }
            BatchOp::Delete { key } => {
                overlay.insert(key.as_str(), Kind::Missing);
            }
            BatchOp::SetAdd { set, .. } | BatchOp::SetRemove { set, .. } => {
                let kind = overlay
                    .get(set.as_str())
                    .copied()
                    .unwrap_or_else(|| kind_of(entries, set, now));
                if kind == Kind::Text {
                    return Err(StoreError::WrongType(set.clone()));
                }
                if matches!(op, BatchOp::SetAdd { .. }) {
                    overlay.insert(set.as_str(), Kind::Set);
                }
            }
        }
    }
    Ok(())
}

fn apply(entries: &mut BTreeMap<String, Entry>, op: BatchOp, now: Instant) -> bool {
    match op {
        BatchOp::SetEx { key, value, ttl } => {
            entries.insert(
                key,
                Entry {
                    value: Value::Text(value),
                    expires_at: Some(now + ttl),
                },
            );
            true
        }
        BatchOp::SetAdd { set, member } => {
            let entry = entries
                .entry(set)
                .and_modify(|e| {
                    if !e.is_live(now) {
                        *e = Entry {
                            value: Value::Set(BTreeSet::new()),
                            expires_at: None,
                        };
                    }
                })
                .or_insert_with(|| Entry {
                    value: Value::Set(BTreeSet::new()),
                    expires_at: None,
                });
            match &mut entry.value {
                Value::Set(members) => members.insert(member),
                Value::Text(_) => false,
            }
        }
        BatchOp::SetRemove { set, member } => {
            let live = entries.get(&set).is_some_and(|e| e.is_live(now));
            if !live {
                return false;
            }
            let mut emptied = false;
            let removed = match entries.get_mut(&set).map(|e| &mut e.value) {
                Some(Value::Set(members)) => {
                    let removed = members.remove(&member);
                    emptied = members.is_empty();
                    removed
                }
                _ => false,
            };
            if emptied {
                entries.remove(&set);
            }
            removed
        }
        BatchOp::Delete { key } => entries
            .remove(&key)
            .is_some_and(|entry| entry.is_live(now)),
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Text(text) => Ok(Some(text.clone())),
                Value::Set(_) => Err(StoreError::WrongType(key.to_string())),
            },
            _ => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.exec_batch(vec![BatchOp::SetEx {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        }])
        .await
    }

    async fn set_add(&self, set: &str, member: &str) -> StoreResult<()> {
        self.exec_batch(vec![BatchOp::SetAdd {
            set: set.to_string(),
            member: member.to_string(),
        }])
        .await
    }

    async fn set_remove(&self, set: &str, member: &str) -> StoreResult<()> {
        self.exec_batch(vec![BatchOp::SetRemove {
            set: set.to_string(),
            member: member.to_string(),
        }])
        .await
    }

    async fn set_members(&self, set: &str) -> StoreResult<BTreeSet<String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(set) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Set(members) => Ok(members.clone()),
                Value::Text(_) => Err(StoreError::WrongType(set.to_string())),
            },
            _ => Ok(BTreeSet::new()),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Ok(apply(
            &mut entries,
            BatchOp::Delete {
                key: key.to_string(),
            },
            now,
        ))
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        let matcher = key_matcher(pattern)?;
        let now = Instant::now();
        let entries = self.entries.read().await;
        let start = cursor as usize;
        let count = count.max(1);

        let keys = entries
            .iter()
            .skip(start)
            .take(count)
            .filter(|(key, entry)| entry.is_live(now) && matcher.is_match(key.as_str()))
            .map(|(key, _)| key.clone())
            .collect();

        let next = start + count;
        let cursor = if next >= entries.len() { 0 } else { next as u64 };
        Ok(ScanPage { cursor, keys })
    }

    async fn exec_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        validate(&entries, &ops, now)?;
        for op in ops {
            apply(&mut entries, op, now);
        }
        Ok(())
    }

    async fn purge_expired(&self) -> StoreResult<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(before - entries.len())
    }
}
