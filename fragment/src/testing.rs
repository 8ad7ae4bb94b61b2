use crate::key::CacheKey;
use crate::ports::FragmentStore;
use async_trait::async_trait;
use bytes::Bytes;
use shared::{BoxError, Error, ExpireTime, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Store double that never expires anything and counts calls.
#[derive(Default)]
pub struct RecordingStore {
    entries: Mutex<HashMap<CacheKey, (Bytes, ExpireTime)>>,
    gets: AtomicUsize,
    sets: AtomicUsize,
    unavailable: AtomicBool,
}

impl RecordingStore {
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn expire_of(&self, key: &CacheKey) -> Option<ExpireTime> {
        self.entries.lock().unwrap().get(key).map(|(_, expire)| *expire)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Store("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FragmentStore for RecordingStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(key)
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &CacheKey, value: Bytes, expire: ExpireTime) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.entries
            .lock()
            .unwrap()
            .insert(key.clone(), (value, expire));
        Ok(())
    }
}

/// Compute callback body that always fails with `message`.
pub async fn failing_render(message: &'static str) -> std::result::Result<Bytes, BoxError> {
    Err(BoxError::from(message))
}
