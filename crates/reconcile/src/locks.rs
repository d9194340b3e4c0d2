//! Per-key async locks.
//!
//! Every find-then-create on a natural key runs under the lock for that
//! key, so two lanes (or two batches sharing an engine) can never both
//! decide a key is free and create it twice.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Entries are pruned once the table grows past this many keys.
const PRUNE_THRESHOLD: usize = 4_096;

#[derive(Debug, Default)]
pub struct KeyLocks {
    table: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Holds one or more key locks until dropped.
#[derive(Debug)]
pub struct KeyGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a single key.
    pub async fn lock(&self, key: String) -> KeyGuard {
        self.lock_all(vec![key]).await
    }

    /// Lock several keys at once. Keys are taken in sorted order so two
    /// callers with overlapping key sets cannot deadlock.
    pub async fn lock_all(&self, mut keys: Vec<String>) -> KeyGuard {
        keys.sort();
        keys.dedup();
        let mutexes: Vec<_> = keys.iter().map(|k| self.entry(k)).collect();

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }
        KeyGuard { _guards: guards }
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if table.len() > PRUNE_THRESHOLD {
            table.retain(|_, m| Arc::strong_count(m) > 1);
        }
        Arc::clone(table.entry(key.to_string()).or_default())
    }
}

/// Lock key for a site name.
pub fn site_key(match_key: &str) -> String {
    format!("site:{match_key}")
}

pub fn model_key(model_no: &str) -> String {
    format!("model:{}", model_no.to_uppercase())
}

pub fn projector_key(serial: &str) -> String {
    format!("projector:{}", serial.to_uppercase())
}

pub fn audi_key(site_id: i64, audi_no: &str) -> String {
    format!("audi:{site_id}:{}", audi_no.to_uppercase())
}

/// Lock key for a case key family; shared by every variant of `base`.
pub fn case_key(field: &str, base: &str) -> String {
    format!("case:{field}:{base}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyLocks::new());
        let guard = locks.lock("projector:S1".into()).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.lock("projector:S1".into()).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.lock("site:a".into()).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("site:b".into())).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn duplicate_keys_in_one_call_do_not_self_deadlock() {
        let locks = KeyLocks::new();
        let guard = tokio::time::timeout(
            Duration::from_millis(100),
            locks.lock_all(vec!["case:x".into(), "case:x".into()]),
        )
        .await;
        assert!(guard.is_ok());
    }
}
