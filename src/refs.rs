use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use log::{debug, warn};
use parking_lot::Mutex;

/// Mints and frees in-process URLs that stand in for fetched bytes.
pub trait LocalRefStore {
    /// Stores `bytes` and returns a URL a loader can read them back from.
    fn mint(&self, bytes: Vec<u8>, mime_type: &str) -> Result<String>;

    /// Frees a URL previously returned by [`LocalRefStore::mint`].
    fn release(&self, url: &str);
}

impl<T> LocalRefStore for Arc<T>
where
    T: LocalRefStore + ?Sized,
{
    fn mint(&self, bytes: Vec<u8>, mime_type: &str) -> Result<String> {
        (**self).mint(bytes, mime_type)
    }

    fn release(&self, url: &str) {
        (**self).release(url)
    }
}

/// Outcome of resolving a model URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    pub load_url: String,
    /// Set only when the URL was minted by this viewer and must be released.
    pub owns_lifetime: bool,
    /// The source is on a cross-origin storage host and every workaround failed.
    pub degraded: bool,
}

impl FetchedResource {
    pub fn pass_through(url: impl Into<String>) -> Self {
        Self {
            load_url: url.into(),
            owns_lifetime: false,
            degraded: false,
        }
    }

    pub fn degraded(url: impl Into<String>) -> Self {
        Self {
            degraded: true,
            ..Self::pass_through(url)
        }
    }

    pub fn owned(url: impl Into<String>) -> Self {
        Self {
            load_url: url.into(),
            owns_lifetime: true,
            degraded: false,
        }
    }

    /// Frees the minted URL if this resource owns one. Calling it again is a no-op.
    pub fn release(&mut self, store: &dyn LocalRefStore) -> bool {
        if !self.owns_lifetime {
            return false;
        }
        self.owns_lifetime = false;
        store.release(&self.load_url);
        true
    }
}

pub const MEMORY_REF_PREFIX: &str = "blob:artifact-viewer/";

/// Local-reference store that keeps minted bytes in memory.
#[derive(Debug, Default)]
pub struct MemoryRefStore {
    entries: Mutex<HashMap<String, Arc<[u8]>>>,
    next_id: AtomicU64,
    minted: AtomicU64,
    release_calls: AtomicU64,
}

impl MemoryRefStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_local_ref(url: &str) -> bool {
        url.starts_with(MEMORY_REF_PREFIX)
    }

    /// Returns the bytes behind a live URL.
    pub fn get(&self, url: &str) -> Option<Arc<[u8]>> {
        self.entries.lock().get(url).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn minted_count(&self) -> u64 {
        self.minted.load(Ordering::Relaxed)
    }

    /// Number of release calls, including ones for unknown URLs.
    pub fn release_calls(&self) -> u64 {
        self.release_calls.load(Ordering::Relaxed)
    }
}

impl LocalRefStore for MemoryRefStore {
    fn mint(&self, bytes: Vec<u8>, mime_type: &str) -> Result<String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let url = format!("{MEMORY_REF_PREFIX}{id}");
        debug!("minted {url} ({} bytes, {mime_type})", bytes.len());
        self.entries
            .lock()
            .insert(url.clone(), Arc::from(bytes.into_boxed_slice()));
        self.minted.fetch_add(1, Ordering::Relaxed);
        Ok(url)
    }

    fn release(&self, url: &str) {
        self.release_calls.fetch_add(1, Ordering::Relaxed);
        if self.entries.lock().remove(url).is_none() {
            warn!("release of unknown local reference {url}");
        } else {
            debug!("released {url}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_and_release_track_counts() {
        let store = MemoryRefStore::new();
        let url = store.mint(vec![1, 2, 3], "model/gltf-binary").unwrap();
        assert!(MemoryRefStore::is_local_ref(&url));
        assert_eq!(store.get(&url).as_deref(), Some(&[1u8, 2, 3][..]));
        store.release(&url);
        assert!(store.get(&url).is_none());
        assert_eq!(store.minted_count(), 1);
        assert_eq!(store.release_calls(), 1);
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn resource_release_is_idempotent() {
        let store = MemoryRefStore::new();
        let url = store.mint(vec![0; 4], "text/plain").unwrap();
        let mut resource = FetchedResource::owned(url);
        assert!(resource.release(&store));
        assert!(!resource.release(&store));
        assert!(!resource.owns_lifetime);
        assert_eq!(store.release_calls(), 1);
    }

    #[test]
    fn pass_through_resources_are_never_released() {
        let store = MemoryRefStore::new();
        let mut resource = FetchedResource::pass_through("https://example.com/a.glb");
        assert!(!resource.release(&store));
        assert_eq!(store.release_calls(), 0);
    }
}
