//! Shared key/value store through which components exchange stream handles

use std::collections::HashMap;
use std::sync::RwLock;

use log::trace;

use crate::display::OutputStreamHandle;

pub trait StreamStore: Send + Sync {
    fn set(&self, key: &str, handle: OutputStreamHandle);

    fn get(&self, key: &str) -> Option<OutputStreamHandle>;

    fn remove(&self, key: &str) -> Option<OutputStreamHandle>;
}

#[derive(Default)]
pub struct MemoryStreamStore {
    streams: RwLock<HashMap<String, OutputStreamHandle>>,
}

impl MemoryStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let streams = self.streams.read().unwrap_or_else(|e| e.into_inner());
        streams.keys().cloned().collect()
    }
}

impl StreamStore for MemoryStreamStore {
    fn set(&self, key: &str, handle: OutputStreamHandle) {
        trace!("Store: {key} -> {}", handle.id());
        let mut streams = self.streams.write().unwrap_or_else(|e| e.into_inner());
        streams.insert(key.to_string(), handle);
    }

    fn get(&self, key: &str) -> Option<OutputStreamHandle> {
        let streams = self.streams.read().unwrap_or_else(|e| e.into_inner());
        streams.get(key).cloned()
    }

    fn remove(&self, key: &str) -> Option<OutputStreamHandle> {
        let mut streams = self.streams.write().unwrap_or_else(|e| e.into_inner());
        streams.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{MemorySurfaceProvider, SurfaceProvider};

    #[test]
    fn set_get_remove() {
        let store = MemoryStreamStore::new();
        let surface = MemorySurfaceProvider::default().create_surface(2, 2).unwrap();
        let handle = surface.capture_stream();

        assert!(store.get("filtered_stream").is_none());
        store.set("filtered_stream", handle.clone());
        assert_eq!(store.get("filtered_stream"), Some(handle.clone()));
        assert_eq!(store.keys(), vec!["filtered_stream".to_string()]);

        assert_eq!(store.remove("filtered_stream"), Some(handle));
        assert!(store.get("filtered_stream").is_none());
    }
}
