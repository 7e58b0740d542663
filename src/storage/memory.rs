use super::ObjectStore;
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content: Vec<u8>,
    pub content_type: Option<String>,
}

/// Process-local store with switches for simulating outages.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    bucket: String,
    objects: Arc<Mutex<BTreeMap<String, StoredObject>>>,
    fail_puts: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            fail_puts: Arc::new(AtomicBool::new(false)),
            fail_deletes: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }

    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, content: Vec<u8>, content_type: Option<&str>) -> AppResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(AppError::Storage(format!("Upload of {} failed: store unavailable", key)));
        }
        let object = StoredObject {
            content,
            content_type: content_type.map(ToString::to_string),
        };
        self.objects.lock().await.insert(key.to_string(), object);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Storage(format!("Delete of {} failed: store unavailable", key)));
        }
        self.objects.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::storage::ObjectStore;

    #[tokio::test]
    async fn put_replaces_and_delete_removes() {
        let store = MemoryStore::new("test-bucket");
        store.put("1/a.png", vec![1, 2], Some("image/png")).await.expect("put");
        store.put("1/a.png", vec![3], None).await.expect("replace");
        assert_eq!(store.get("1/a.png").await.expect("stored").content, vec![3]);

        store.delete("1/a.png").await.expect("delete");
        store.delete("1/a.png").await.expect("delete missing");
        assert!(store.keys().await.is_empty());
    }

    #[tokio::test]
    async fn outage_switches_fail_operations() {
        let store = MemoryStore::new("test-bucket");
        store.set_fail_puts(true);
        assert!(store.put("k", vec![], None).await.is_err());
        store.set_fail_deletes(true);
        assert!(store.delete("k").await.is_err());
    }
}
