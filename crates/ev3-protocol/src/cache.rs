//! Cache for read-style command frames.
//!
//! Read commands are re-issued at polling frequency with identical
//! arguments, so the builders memoize the encoded frame under a
//! `name:json(args)` key. Entries are never evicted, the whole cache is
//! dropped on disconnect.

use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct CommandCache {
    entries: HashMap<String, Vec<u8>>,
}

impl CommandCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key<A: Serialize>(name: &str, args: &A) -> String {
        match serde_json::to_string(args) {
            Ok(json) => format!("{name}:{json}"),
            Err(_) => format!("{name}:?"),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    pub fn set(&mut self, key: String, frame: Vec<u8>) -> Vec<u8> {
        self.entries.insert(key, frame.clone());
        frame
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_distinguish_arguments() {
        let a = CommandCache::key("getSensorData", &(0x00u8, 0x02u8));
        let b = CommandCache::key("getSensorData", &(0x01u8, 0x02u8));
        assert_ne!(a, b);
        assert_eq!(a, "getSensorData:[0,2]");
    }

    #[test]
    fn hits_return_identical_frames() {
        let mut cache = CommandCache::new();
        let key = CommandCache::key("getBattery", &());
        assert_eq!(cache.get(&key), None);
        cache.set(key.clone(), vec![0x05, 0x00, 0x21, 0x00]);
        assert_eq!(cache.get(&key), Some(vec![0x05, 0x00, 0x21, 0x00]));
        cache.clear();
        assert!(cache.is_empty());
    }
}
