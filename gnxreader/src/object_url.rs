//! Object URLs for in-memory audio clips
//!
//! An [`ObjectUrl`] is a scoped handle: the URL stays resolvable in its
//! [`ObjectUrlRegistry`] for as long as the guard lives and is revoked when
//! it is dropped, on every exit path.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::trace;
use uuid::Uuid;

const URL_SCHEME: &str = "blob:gnx/";

/// Registry of live object URLs
#[derive(Debug, Clone, Default)]
pub struct ObjectUrlRegistry {
    urls: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Bytes>> {
        self.urls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `blob` under a fresh URL
    pub fn create(&self, blob: Bytes) -> ObjectUrl {
        let url = format!("{}{}", URL_SCHEME, Uuid::new_v4());
        self.lock().insert(url.clone(), blob.clone());
        trace!(url = %url, size = blob.len(), "Object URL created");

        ObjectUrl {
            url,
            blob,
            registry: self.clone(),
        }
    }

    /// Number of URLs not yet revoked
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    fn revoke(&self, url: &str) {
        if self.lock().remove(url).is_some() {
            trace!(url = %url, "Object URL revoked");
        }
    }
}

/// A live object URL; revoked on drop
pub struct ObjectUrl {
    url: String,
    blob: Bytes,
    registry: ObjectUrlRegistry,
}

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Clip data, for backends that decode from memory
    pub fn blob(&self) -> &Bytes {
        &self.blob
    }

    /// Revoke now rather than at end of scope
    pub fn revoke(self) {}
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        self.registry.revoke(&self.url);
    }
}

impl fmt::Debug for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectUrl")
            .field("url", &self.url)
            .field("size", &self.blob.len())
            .finish()
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_drop() {
        let registry = ObjectUrlRegistry::new();
        let url = registry.create(Bytes::from_static(b"ID3"));
        assert!(url.as_str().starts_with("blob:gnx/"));
        assert_eq!(registry.live_count(), 1);
        assert_eq!(url.blob().as_ref(), b"ID3");

        drop(url);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_explicit_revoke() {
        let registry = ObjectUrlRegistry::new();
        let a = registry.create(Bytes::from_static(b"a"));
        let b = registry.create(Bytes::from_static(b"b"));
        assert_ne!(a.as_str(), b.as_str());
        assert_eq!(registry.live_count(), 2);

        a.revoke();
        assert_eq!(registry.live_count(), 1);
        assert_eq!(b.blob().as_ref(), b"b");
    }
}
