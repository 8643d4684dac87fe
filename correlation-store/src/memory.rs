//! In-process store backend.
//!
//! Behaves like a single Redis instance shared by every task in the process:
//! string and set values, optional expiry, atomic increment. Expiry uses
//! `tokio::time::Instant`, so tests running on a paused clock control it.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::{Result, StoreError};
use crate::store::CorrelationStore;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Concurrent in-memory [`CorrelationStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    /// Remaining lifetime of a key, `None` when the key is missing or has no expiry.
    pub fn expires_in(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let expires_at = self.entries.get(key)?.expires_at?;
        (expires_at > now).then(|| expires_at.duration_since(now))
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    /// Run `f` on the live value at `key`, evicting it first if expired.
    fn read<R>(&self, key: &str, f: impl FnOnce(&Value) -> R) -> Option<R> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                return Some(f(&entry.value));
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    fn write(&self, key: &str, value: &str, expires_at: Option<Instant>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at,
            },
        );
    }
}

#[async_trait]
impl CorrelationStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.ensure_open()
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_open()?;
        match self.read(key, |value| match value {
            Value::Str(s) => Some(s.clone()),
            Value::Set(_) => None,
        }) {
            None => Ok(None),
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => Err(StoreError::wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_open()?;
        self.write(key, value, None);
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.ensure_open()?;
        self.write(key, value, Some(Instant::now() + ttl));
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.read(key, |_| ()).is_some())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.ensure_open()?;
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Str("0".to_string())));
        if entry.is_expired(now) {
            *entry = Entry::new(Value::Str("0".to_string()));
        }

        match &mut entry.value {
            Value::Str(current) => {
                let next = current
                    .parse::<i64>()
                    .ok()
                    .and_then(|n| n.checked_add(1))
                    .ok_or_else(|| StoreError::wrong_type(key))?;
                *current = next.to_string();
                Ok(next)
            }
            Value::Set(_) => Err(StoreError::wrong_type(key)),
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        self.ensure_open()?;
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Set(BTreeSet::new())));
        if entry.is_expired(now) {
            *entry = Entry::new(Value::Set(BTreeSet::new()));
        }

        match &mut entry.value {
            Value::Set(members) => Ok(members.insert(member.to_string())),
            Value::Str(_) => Err(StoreError::wrong_type(key)),
        }
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        self.ensure_open()?;
        let now = Instant::now();
        let (removed, now_empty) = match self.entries.get_mut(key) {
            None => return Ok(false),
            Some(entry) if entry.is_expired(now) => (false, false),
            Some(mut entry) => match &mut entry.value {
                Value::Set(members) => (members.remove(member), members.is_empty()),
                Value::Str(_) => return Err(StoreError::wrong_type(key)),
            },
        };

        // Sets vanish with their last member
        if now_empty {
            self.entries.remove_if(key, |_, entry| {
                matches!(&entry.value, Value::Set(members) if members.is_empty())
            });
        }
        Ok(removed)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        match self.read(key, |value| match value {
            Value::Set(members) => Some(members.iter().cloned().collect()),
            Value::Str(_) => None,
        }) {
            None => Ok(Vec::new()),
            Some(Some(members)) => Ok(members),
            Some(None) => Err(StoreError::wrong_type(key)),
        }
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.is_expired(now) && glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Memory store already closed");
        } else {
            tracing::info!("Memory store closed ({} keys)", self.entries.len());
        }
        Ok(())
    }
}

/// Glob match supporting `*` (any run) and `?` (any single character).
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p).copied() {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}
