//! In-memory key-value backend.
//!
//! All data is lost when the process exits. Used by tests and ephemeral
//! runs; production uses the SQLite backend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use eventvault_core::IndexError;

use crate::kv::KvStore;

/// In-memory [`KvStore`].
#[derive(Default)]
pub struct MemoryKvStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, IndexError> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), IndexError> {
        self.data.lock().unwrap().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn multi_set(&self, entries: &[(&str, Vec<u8>)]) -> Result<(), IndexError> {
        // The single map lock makes the batch atomic.
        let mut data = self.data.lock().unwrap();
        for (key, value) in entries {
            data.insert(key.to_string(), value.clone());
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), IndexError> {
        Ok(())
    }
}
