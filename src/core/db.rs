use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug)]
pub enum StoreError {
    // Backend unreachable, a call exceeded the configured timeout, or a
    // mutation could not be applied within the retry budget.
    Unavailable(String),
    // A stored document failed to decode.
    Corrupt(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
            StoreError::Corrupt(msg) => write!(f, "corrupt document: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Handle to the document store. One JSON document per key.
///
/// All membership and counter mutations go through the primitives here
/// (`set_add`, `set_remove`, `put_doc_if_absent`, `update_doc`, the list
/// helpers). Handlers never read a whole document just to write back a
/// modified copy of it. Every mutation primitive is atomic per document on
/// both backends: the Spin key-value backend runs it inside a
/// compare-and-swap retry loop, the native backend under a single write lock.
pub struct Documents {
    backend: Backend,
}

enum Backend {
    #[cfg(target_arch = "wasm32")]
    Kv(spin_sdk::key_value::Store),
    #[cfg(not(target_arch = "wasm32"))]
    Memory(std::sync::Arc<memory::MemoryStore>),
}

/// Open the process-wide document store.
///
/// On the Spin target this is the default key-value store. The native binary
/// and the test suite get a process-local in-memory store with the same
/// contract.
pub fn open() -> Result<Documents, StoreError> {
    #[cfg(target_arch = "wasm32")]
    {
        let store = spin_sdk::key_value::Store::open_default()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Documents {
            backend: Backend::Kv(store),
        })
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        Ok(Documents {
            backend: Backend::Memory(memory::shared()),
        })
    }
}

impl Documents {
    /// A private store, fully isolated from `open()`. Test use.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn in_memory() -> Documents {
        Documents {
            backend: Backend::Memory(std::sync::Arc::new(memory::MemoryStore::new())),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn handle(&self) -> Documents {
        let Backend::Memory(mem) = &self.backend;
        Documents {
            backend: Backend::Memory(std::sync::Arc::clone(mem)),
        }
    }

    fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        match &self.backend {
            #[cfg(target_arch = "wasm32")]
            Backend::Kv(store) => match store.get(key) {
                Ok(Some(bytes)) => String::from_utf8(bytes)
                    .map(Some)
                    .map_err(|e| StoreError::Corrupt(format!("{}: {}", key, e))),
                Ok(None) => Ok(None),
                Err(e) => Err(StoreError::Unavailable(e.to_string())),
            },
            #[cfg(not(target_arch = "wasm32"))]
            Backend::Memory(mem) => mem.get(key),
        }
    }

    fn put_raw(&self, key: &str, json: String) -> Result<(), StoreError> {
        match &self.backend {
            #[cfg(target_arch = "wasm32")]
            Backend::Kv(store) => store
                .set(key, json.as_bytes())
                .map_err(|e| StoreError::Unavailable(e.to_string())),
            #[cfg(not(target_arch = "wasm32"))]
            Backend::Memory(mem) => mem.put(key, json),
        }
    }

    /// One atomic document update: `f` sees the current raw document (or
    /// `None`) and leaves behind whatever it writes into the slot.
    ///
    /// `f` may run more than once on the Spin backend when a concurrent
    /// writer wins the swap, so it must be free of side effects.
    fn update_raw<R>(
        &self,
        key: &str,
        f: impl FnMut(&mut Option<String>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        match &self.backend {
            #[cfg(target_arch = "wasm32")]
            Backend::Kv(store) => kv::update(store, key, f),
            #[cfg(not(target_arch = "wasm32"))]
            Backend::Memory(mem) => {
                let mut f = f;
                mem.with_entry(key, |entry| f(entry))?
            }
        }
    }

    pub fn get_doc<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get_raw(key)? {
            Some(raw) => decode(key, &raw).map(Some),
            None => Ok(None),
        }
    }

    pub fn put_doc<T: Serialize>(&self, key: &str, doc: &T) -> Result<(), StoreError> {
        self.put_raw(key, encode(key, doc)?)
    }

    /// Write `doc` only when `key` holds nothing yet. Returns whether the
    /// write happened; a claim that lost to a concurrent writer returns
    /// `false`.
    pub fn put_doc_if_absent<T: Serialize>(&self, key: &str, doc: &T) -> Result<bool, StoreError> {
        let json = encode(key, doc)?;
        self.update_raw(key, |entry| {
            if entry.is_some() {
                return Ok(false);
            }
            *entry = Some(json.clone());
            Ok(true)
        })
    }

    pub fn delete_doc(&self, key: &str) -> Result<(), StoreError> {
        match &self.backend {
            #[cfg(target_arch = "wasm32")]
            Backend::Kv(store) => store
                .delete(key)
                .map_err(|e| StoreError::Unavailable(e.to_string())),
            #[cfg(not(target_arch = "wasm32"))]
            Backend::Memory(mem) => mem.delete(key),
        }
    }

    pub fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get_raw(key)?.is_some())
    }

    /// Atomically rewrite the document at `key` through `f`.
    ///
    /// Returns `None` when the document does not exist, otherwise whatever
    /// `f` returned. Like all mutation primitives here, `f` may be retried
    /// against a fresh copy when a concurrent writer got in first.
    pub fn update_doc<T, R, F>(&self, key: &str, mut f: F) -> Result<Option<R>, StoreError>
    where
        T: DeserializeOwned + Serialize,
        F: FnMut(&mut T) -> R,
    {
        self.update_raw(key, |entry| {
            let Some(raw) = entry.as_deref() else {
                return Ok(None);
            };
            let mut doc: T = decode(key, raw)?;
            let out = f(&mut doc);
            *entry = Some(encode(key, &doc)?);
            Ok(Some(out))
        })
    }

    /// Add `member` to the set document at `key`, creating the document if
    /// needed. Returns whether the member was newly added.
    pub fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.update_raw(key, |entry| {
            let mut members: Vec<String> = match entry.as_deref() {
                Some(raw) => decode(key, raw)?,
                None => Vec::new(),
            };
            if members.iter().any(|m| m == member) {
                return Ok(false);
            }
            members.push(member.to_string());
            *entry = Some(encode(key, &members)?);
            Ok(true)
        })
    }

    /// Remove `member` from the set document at `key`. Absent membership is
    /// not an error. Returns whether the member was present.
    pub fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.update_raw(key, |entry| {
            let mut members: Vec<String> = match entry.as_deref() {
                Some(raw) => decode(key, raw)?,
                None => return Ok(false),
            };
            let before = members.len();
            members.retain(|m| m != member);
            if members.len() == before {
                return Ok(false);
            }
            *entry = Some(encode(key, &members)?);
            Ok(true)
        })
    }

    pub fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.get_doc(key)?.unwrap_or_default())
    }

    pub fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self.set_members(key)?.iter().any(|m| m == member))
    }

    pub fn set_len(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self.set_members(key)?.len())
    }

    /// Insert `item` at the front of the list document at `key` (newest first).
    pub fn list_prepend(&self, key: &str, item: &str) -> Result<(), StoreError> {
        self.list_insert(key, item, true)
    }

    /// Append `item` to the back of the list document at `key`.
    pub fn list_append(&self, key: &str, item: &str) -> Result<(), StoreError> {
        self.list_insert(key, item, false)
    }

    fn list_insert(&self, key: &str, item: &str, front: bool) -> Result<(), StoreError> {
        self.update_raw(key, |entry| {
            let mut items: Vec<String> = match entry.as_deref() {
                Some(raw) => decode(key, raw)?,
                None => Vec::new(),
            };
            if front {
                items.insert(0, item.to_string());
            } else {
                items.push(item.to_string());
            }
            *entry = Some(encode(key, &items)?);
            Ok(())
        })
    }

    pub fn list_remove(&self, key: &str, item: &str) -> Result<(), StoreError> {
        self.update_raw(key, |entry| {
            let mut items: Vec<String> = match entry.as_deref() {
                Some(raw) => decode(key, raw)?,
                None => return Ok(()),
            };
            items.retain(|i| i != item);
            *entry = Some(encode(key, &items)?);
            Ok(())
        })
    }

    pub fn list_items(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.get_doc(key)?.unwrap_or_default())
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(format!("{}: {}", key, e)))
}

fn encode<T: Serialize>(key: &str, doc: &T) -> Result<String, StoreError> {
    serde_json::to_string(doc).map_err(|e| StoreError::Corrupt(format!("{}: {}", key, e)))
}

#[cfg(target_arch = "wasm32")]
mod kv {
    use spin_sdk::key_value::{CasError, Store};

    use super::StoreError;

    // Bounded optimistic retries; contention past this surfaces as 503.
    const MAX_SWAP_ATTEMPTS: usize = 16;

    /// Run `f` against the current document and persist the result through
    /// the host's compare-and-swap, rereading and retrying when a concurrent
    /// writer swapped first.
    pub(super) fn update<R>(
        store: &Store,
        key: &str,
        mut f: impl FnMut(&mut Option<String>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        for _ in 0..MAX_SWAP_ATTEMPTS {
            let cas = store.new_cas(key).map_err(unavailable)?;
            let mut entry = match cas.current().map_err(unavailable)? {
                Some(bytes) => Some(
                    String::from_utf8(bytes)
                        .map_err(|e| StoreError::Corrupt(format!("{}: {}", key, e)))?,
                ),
                None => None,
            };

            let before = entry.clone();
            let out = f(&mut entry)?;
            if entry == before {
                return Ok(out);
            }

            match entry {
                Some(value) => match cas.swap(value.into_bytes()) {
                    Ok(()) => return Ok(out),
                    Err(CasError::CasFailed(_)) => continue,
                    Err(e) => return Err(StoreError::Unavailable(format!("{:?}", e))),
                },
                // No mutation through here clears a document today.
                None => {
                    store.delete(key).map_err(unavailable)?;
                    return Ok(out);
                }
            }
        }

        Err(StoreError::Unavailable(format!(
            "swap contention on {}",
            key
        )))
    }

    fn unavailable(e: spin_sdk::key_value::Error) -> StoreError {
        StoreError::Unavailable(e.to_string())
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod memory {
    use std::collections::HashMap;
    use std::sync::{Arc, OnceLock, RwLock, TryLockError};
    use std::time::{Duration, Instant};

    use super::StoreError;
    use crate::config::store_timeout_secs;

    pub(super) fn shared() -> Arc<MemoryStore> {
        static SHARED: OnceLock<Arc<MemoryStore>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(MemoryStore::new())))
    }

    pub(super) struct MemoryStore {
        map: RwLock<HashMap<String, String>>,
        timeout: Duration,
    }

    impl MemoryStore {
        pub(super) fn new() -> MemoryStore {
            MemoryStore {
                map: RwLock::new(HashMap::new()),
                timeout: Duration::from_secs(store_timeout_secs()),
            }
        }

        pub(super) fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            let deadline = Instant::now() + self.timeout;
            loop {
                match self.map.try_read() {
                    Ok(map) => return Ok(map.get(key).cloned()),
                    Err(TryLockError::Poisoned(_)) => {
                        return Err(StoreError::Unavailable("store lock poisoned".to_string()))
                    }
                    Err(TryLockError::WouldBlock) => {
                        if Instant::now() >= deadline {
                            return Err(StoreError::Unavailable("read timed out".to_string()));
                        }
                        std::thread::yield_now();
                    }
                }
            }
        }

        pub(super) fn put(&self, key: &str, json: String) -> Result<(), StoreError> {
            self.with_entry(key, |entry| {
                *entry = Some(json);
            })
        }

        pub(super) fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.with_entry(key, |entry| {
                *entry = None;
            })
        }

        /// One atomic document update under the write lock: `f` sees the
        /// current raw document (or `None`) and leaves behind whatever it
        /// writes into the slot.
        pub(super) fn with_entry<R>(
            &self,
            key: &str,
            f: impl FnOnce(&mut Option<String>) -> R,
        ) -> Result<R, StoreError> {
            let deadline = Instant::now() + self.timeout;
            loop {
                match self.map.try_write() {
                    Ok(mut map) => {
                        let mut entry = map.get(key).cloned();
                        let out = f(&mut entry);
                        match entry {
                            Some(value) => {
                                map.insert(key.to_string(), value);
                            }
                            None => {
                                map.remove(key);
                            }
                        }
                        return Ok(out);
                    }
                    Err(TryLockError::Poisoned(_)) => {
                        return Err(StoreError::Unavailable("store lock poisoned".to_string()))
                    }
                    Err(TryLockError::WouldBlock) => {
                        if Instant::now() >= deadline {
                            return Err(StoreError::Unavailable("write timed out".to_string()));
                        }
                        std::thread::yield_now();
                    }
                }
            }
        }
    }
}
