//! Common test utilities for session tests
//!
//! Provides logging setup and a store wrapper that can fail or stall
//! individual keys on demand.

#![allow(dead_code)]

use async_trait::async_trait;
use edulink_core::{storage_error, EdulinkResult, KeyValueStore};
use edulink_session::MemoryStore;
use std::collections::HashSet;
use std::sync::{Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

/// Initialize logging for tests
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("edulink_session=debug,edulink_core=debug")
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Set,
    Remove,
}

/// [`MemoryStore`] with per-key fault injection
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<(Op, String)>>,
    get_delay: Mutex<Option<Duration>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<const N: usize>(entries: [(&str, &str); N]) -> Self {
        Self {
            inner: MemoryStore::with_entries(entries),
            ..Self::default()
        }
    }

    /// Make `op` on `key` fail until [`heal`](Self::heal) is called
    pub fn fail(&self, op: Op, key: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert((op, key.to_string()));
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Make every `get` sleep before answering
    pub fn delay_gets(&self, delay: Duration) {
        *self.get_delay.lock().unwrap() = Some(delay);
    }

    /// Read straight from the backing map, bypassing faults
    pub async fn raw(&self, key: &str) -> Option<String> {
        self.inner.get(key).await.unwrap()
    }

    fn check(&self, op: Op, key: &str) -> EdulinkResult<()> {
        if self.failing.lock().unwrap().contains(&(op, key.to_string())) {
            return Err(storage_error!(
                format!("injected {:?} failure", op),
                key,
                "faulty_store"
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FaultyStore {
    async fn get(&self, key: &str) -> EdulinkResult<Option<String>> {
        let delay = *self.get_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(Op::Get, key)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> EdulinkResult<()> {
        self.check(Op::Set, key)?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> EdulinkResult<()> {
        self.check(Op::Remove, key)?;
        self.inner.remove(key).await
    }
}
