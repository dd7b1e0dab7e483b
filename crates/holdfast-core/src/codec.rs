use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CoreError, CoreResult};

/// Serialization wrapper that guards the shared text codec.
///
/// The host's text codec is shared by every snapshot store and is not
/// independently safe for concurrent use, so all encode/decode calls are
/// funneled through one private mutex. Stores hold the guard only for the
/// duration of the encode/decode call itself, never across file I/O.
///
/// Lock order: the per-store lock is always the outer lock and this guard
/// the inner one. Because the mutex is private to this type and nothing is
/// called back while it is held, the nesting cannot invert.
#[derive(Debug, Default)]
pub struct GuardedCodec {
    guard: Mutex<()>,
}

impl GuardedCodec {
    /// Create a fresh codec guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `value` to a JSON document string.
    pub fn encode<T: Serialize>(&self, value: &T) -> CoreResult<String> {
        let _guard = self.guard.lock().expect("codec mutex poisoned");
        serde_json::to_string_pretty(value).map_err(|e| CoreError::Encode(e.to_string()))
    }

    /// Parse a JSON document string.
    pub fn decode<T: DeserializeOwned>(&self, text: &str) -> CoreResult<T> {
        let _guard = self.guard.lock().expect("codec mutex poisoned");
        serde_json::from_str(text).map_err(|e| CoreError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[test]
    fn encode_decode_roundtrip() {
        let codec = GuardedCodec::new();
        let mut map = BTreeMap::new();
        map.insert("pkgA".to_string(), 5u8);
        map.insert("pkgB".to_string(), 3u8);

        let text = codec.encode(&map).unwrap();
        let back: BTreeMap<String, u8> = codec.decode(&text).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn decode_garbage_is_an_error() {
        let codec = GuardedCodec::new();
        let result: CoreResult<BTreeMap<String, u8>> = codec.decode("not json at all");
        assert!(matches!(result, Err(CoreError::Decode(_))));
    }

    #[test]
    fn shared_across_threads() {
        let codec = Arc::new(GuardedCodec::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let codec = Arc::clone(&codec);
                std::thread::spawn(move || {
                    let mut map = BTreeMap::new();
                    map.insert(format!("key{i}"), i as u8);
                    let text = codec.encode(&map).unwrap();
                    let back: BTreeMap<String, u8> = codec.decode(&text).unwrap();
                    assert_eq!(back, map);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
