//! A single logical keyspace: a `data` dict paired with an `expire`
//! dict tracking absolute millisecond timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

use emberkv_core::limits::EXPIRE_CYCLE_SAMPLE_SIZE;
use emberkv_datastruct::Dict;

use crate::value::Value;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}

/// One of the server's `N` logical keyspaces (`SELECT 0..N-1`).
///
/// `expire` keys are always a subset of `data` keys (§3): every path
/// that removes a key from `data` must also remove it from `expire`.
pub struct Database {
    pub id: usize,
    data: Dict<String, Value>,
    expire: Dict<String, i64>,
}

impl Database {
    pub fn new(id: usize) -> Self {
        Database {
            id,
            data: Dict::new(),
            expire: Dict::new(),
        }
    }

    /// If `key` has a TTL in the past, removes it from both dicts and
    /// returns `true`. Called by every read-path command before it
    /// looks at the value (§4.7's lazy expiration rule).
    pub fn expire_if_needed(&mut self, key: &str) -> bool {
        let expired = match self.expire.get(&key.to_string()) {
            Some(&when) => when < now_ms(),
            None => false,
        };
        if expired {
            self.data.delete(&key.to_string()).ok();
            self.expire.delete(&key.to_string()).ok();
        }
        expired
    }

    /// Looks up `key`, applying lazy expiration first.
    pub fn get(&mut self, key: &str) -> Option<&Value> {
        self.expire_if_needed(key);
        self.data.get(&key.to_string())
    }

    /// Mutable lookup, same expiration semantics as [`Database::get`].
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.expire_if_needed(key);
        self.data.get_mut(&key.to_string())
    }

    /// Sets `key`'s value, clearing any existing TTL (matches `SET`'s
    /// semantics: a plain write always clears expiry).
    pub fn set(&mut self, key: String, value: Value) {
        self.expire.delete(&key).ok();
        self.data.set(key, value);
    }

    /// Sets `key`'s value without touching its TTL. Used by commands
    /// that mutate a container value in place (`LPUSH`, `HSET`, ...)
    /// where the key may already carry an expiry that must survive.
    pub fn set_keep_ttl(&mut self, key: String, value: Value) {
        self.data.set(key, value);
    }

    /// Removes `key` from both dicts. Returns `true` if it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let existed = self.data.delete(&key.to_string()).is_ok();
        self.expire.delete(&key.to_string()).ok();
        existed
    }

    /// True if `key` exists and is not expired.
    pub fn contains(&mut self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sets `key`'s absolute expiry to `when_ms`. Does not require the
    /// key to currently exist in `data` (matches the source's
    /// `EXPIRE`/`EXPIREAT` commands, which set `expire` unconditionally).
    pub fn set_expire_at_ms(&mut self, key: String, when_ms: i64) {
        self.expire.set(key, when_ms);
    }

    /// `-2` if missing, `-1` if no TTL, else seconds remaining.
    pub fn ttl_seconds(&mut self, key: &str) -> i64 {
        if !self.data.contains_key(&key.to_string()) {
            return -2;
        }
        match self.expire.get(&key.to_string()) {
            None => -1,
            Some(&when) => (when - now_ms()) / 1000,
        }
    }

    /// Number of live keys, without sweeping expired entries (matches
    /// `DBSIZE`, which is a plain count, not an expiration pass).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All non-expired keys, applying lazy expiration to every
    /// candidate as `KEYS` does in the source.
    pub fn keys(&mut self) -> Vec<String> {
        let candidates: Vec<String> = self.data.iter().map(|(k, _)| k.clone()).collect();
        candidates
            .into_iter()
            .filter(|k| !self.expire_if_needed(k))
            .collect()
    }

    /// A random live key, skipping (and reclaiming) expired ones.
    pub fn random_key(&mut self) -> Option<String> {
        loop {
            let candidate = self.data.random_entry().map(|(k, _)| k.clone())?;
            if !self.expire_if_needed(&candidate) {
                return Some(candidate);
            }
        }
    }

    /// Clears every key and its TTL (`FLUSHDB`).
    pub fn flush(&mut self) {
        self.data = Dict::new();
        self.expire = Dict::new();
    }

    /// Samples up to [`EXPIRE_CYCLE_SAMPLE_SIZE`] random `expire`
    /// entries and reclaims any that are in the past. Used by the
    /// server cron's active expiration sweep (§4.9).
    pub fn sample_expired(&mut self) -> usize {
        let mut reclaimed = 0;
        for _ in 0..EXPIRE_CYCLE_SAMPLE_SIZE {
            let candidate = match self.expire.random_entry() {
                Some((k, _)) => k.clone(),
                None => break,
            };
            if self.expire_if_needed(&candidate) {
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// Deep-copies `data` and `expire` for a background AOF rewrite
    /// snapshot. Uses each dict's iterator-backed `deep_copy`, so no
    /// rehash step runs mid-copy (§4.2, §9).
    pub fn deep_copy(&self) -> DatabaseSnapshot {
        DatabaseSnapshot {
            id: self.id,
            data_keys: self.data.iter().map(|(k, v)| (k.clone(), snapshot_value(v))).collect(),
            expire: self.expire.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }
}

/// An owned, independent copy of a database's contents, safe to hand
/// to the background AOF rewrite worker.
pub struct DatabaseSnapshot {
    pub id: usize,
    pub data_keys: Vec<(String, ValueSnapshot)>,
    pub expire: Vec<(String, i64)>,
}

/// A cloned `Value`, used only for rewrite snapshots (the live `Value`
/// type deliberately does not implement `Clone` so that hot-path
/// mutation never pays for an accidental copy).
pub enum ValueSnapshot {
    String(Vec<u8>),
    Hash(Vec<(String, Vec<u8>)>),
    List(Vec<Vec<u8>>),
    Set(Vec<String>),
    Zset(Vec<(String, f64)>),
}

fn snapshot_value(v: &Value) -> ValueSnapshot {
    match v {
        Value::String(s) => ValueSnapshot::String(s.clone()),
        Value::Hash(h) => ValueSnapshot::Hash(h.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        Value::List(l) => ValueSnapshot::List(l.range(0, l.len() as i64 - 1)),
        Value::Set(s) => ValueSnapshot::Set(s.members()),
        Value::Zset(z) => ValueSnapshot::Zset(
            z.range_by_rank(0, i64::MAX, false)
                .into_iter()
                .map(|e| (e.member, e.score))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clears_prior_ttl() {
        let mut db = Database::new(0);
        db.set_expire_at_ms("k".into(), now_ms() + 60_000);
        db.set("k".into(), Value::String(b"v".to_vec()));
        assert_eq!(db.ttl_seconds("k"), -1);
    }

    #[test]
    fn expired_key_disappears_from_get_and_keys() {
        let mut db = Database::new(0);
        db.set("k".into(), Value::String(b"v".to_vec()));
        db.set_expire_at_ms("k".into(), now_ms() - 1000);
        assert!(db.get("k").is_none());
        assert!(db.keys().is_empty());
    }

    #[test]
    fn ttl_reports_missing_no_ttl_and_remaining() {
        let mut db = Database::new(0);
        assert_eq!(db.ttl_seconds("missing"), -2);
        db.set("k".into(), Value::String(b"v".to_vec()));
        assert_eq!(db.ttl_seconds("k"), -1);
        db.set_expire_at_ms("k".into(), now_ms() + 10_000);
        let ttl = db.ttl_seconds("k");
        assert!((8..=10).contains(&ttl), "ttl was {ttl}");
    }

    #[test]
    fn remove_drops_expire_entry_too() {
        let mut db = Database::new(0);
        db.set("k".into(), Value::String(b"v".to_vec()));
        db.set_expire_at_ms("k".into(), now_ms() + 10_000);
        assert!(db.remove("k"));
        assert_eq!(db.ttl_seconds("k"), -2);
    }

    #[test]
    fn sample_expired_reclaims_past_ttls() {
        let mut db = Database::new(0);
        for i in 0..10 {
            db.set(format!("k{i}"), Value::String(b"v".to_vec()));
            db.set_expire_at_ms(format!("k{i}"), now_ms() - 1000);
        }
        let reclaimed = db.sample_expired();
        assert_eq!(reclaimed, 10);
        assert_eq!(db.len(), 0);
    }

    #[test]
    fn flush_clears_everything() {
        let mut db = Database::new(0);
        db.set("a".into(), Value::String(b"1".to_vec()));
        db.set("b".into(), Value::String(b"2".to_vec()));
        db.flush();
        assert!(db.is_empty());
    }
}
