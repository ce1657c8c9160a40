//! In-memory cache backend

use super::backend::{BackendError, BackendResult, CacheBackend};
use std::collections::HashMap;
use std::sync::Mutex;

/// Process-local backend, used by tests and `--no-persist` runs
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> BackendResult<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| BackendError::Storage("memory backend lock poisoned".to_string()))
    }
}

impl CacheBackend for MemoryBackend {
    fn read(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn write(&self, key: &str, bytes: &[u8]) -> BackendResult<()> {
        self.lock()?.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn list_keys(&self) -> BackendResult<Vec<String>> {
        let mut keys: Vec<String> = self.lock()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, key: &str) -> BackendResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_crud() {
        let backend = MemoryBackend::new();
        assert!(backend.read("a").unwrap().is_none());

        backend.write("b", b"2").unwrap();
        backend.write("a", b"1").unwrap();
        assert_eq!(backend.read("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(backend.list_keys().unwrap(), vec!["a", "b"]);

        backend.delete("a").unwrap();
        backend.delete("missing").unwrap();
        assert_eq!(backend.len(), 1);
    }
}
