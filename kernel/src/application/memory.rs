//! Run-time object memory with optional write-through to the cache service.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::application::error_handler::{ErrorHandler, ErrorLevel};
use crate::application::ports::cache::Cache;
use crate::bootstrap::error::KernelError;

static KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[\w\-.@+:]{3,128}$").expect("valid regex"));

type Instance = Arc<dyn Any + Send + Sync>;

/// Objects live for one request or script run; the cache outlives them.
pub struct Memory {
    instances: Mutex<HashMap<String, Instance>>,
    cache: Option<Arc<dyn Cache>>,
    errors: ErrorHandler,
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("instances", &self.lock().len())
            .field("caching", &self.cache.is_some())
            .finish()
    }
}

impl Memory {
    pub fn new(errors: ErrorHandler) -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            cache: None,
            errors,
        }
    }

    pub fn caching(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn is_caching(&self) -> bool {
        self.cache.is_some()
    }

    pub fn query<T>(&self, key: impl Into<String>) -> Query<'_, T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        Query {
            memory: self,
            key: key.into(),
            cache: false,
            ttl: 0,
            _type: PhantomData,
        }
    }

    /// Stores an object in run-time memory and, when `cache` is set and a
    /// cache is attached, in the cache as JSON.
    pub async fn set<T>(&self, key: &str, object: T, cache: bool, ttl: u64) -> Result<Arc<T>, KernelError>
    where
        T: Serialize + Send + Sync + 'static,
    {
        validate_key(key)?;
        let object = Arc::new(object);
        self.lock().insert(key.to_string(), object.clone());

        if cache {
            if let Some(store) = &self.cache {
                match serde_json::to_string(object.as_ref()) {
                    Ok(json) => {
                        if let Err(e) = store.set(key, &json, ttl).await {
                            self.errors.trigger(format!("{e:#}"), ErrorLevel::Warning);
                        }
                    }
                    Err(e) => self.errors.trigger(e.to_string(), ErrorLevel::Warning),
                }
            }
        }
        Ok(object)
    }

    pub fn flush(&self) {
        self.lock().clear();
    }

    async fn get<T>(&self, key: &str, cache: bool, ttl: u64, callback: Option<impl Future<Output = Option<T>>>) -> Result<Option<Arc<T>>, KernelError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        validate_key(key)?;

        let found = self.lock().get(key).cloned();
        if let Some(Ok(object)) = found.map(|o| o.downcast::<T>()) {
            return Ok(Some(object));
        }

        if cache {
            if let Some(store) = &self.cache {
                match store.get(key).await {
                    Ok(Some(json)) => match serde_json::from_str::<T>(&json) {
                        Ok(object) => {
                            let object = Arc::new(object);
                            self.lock().insert(key.to_string(), object.clone());
                            return Ok(Some(object));
                        }
                        Err(e) => self.errors.trigger(
                            format!("Cached memory object \"{key}\" could not be decoded: {e}"),
                            ErrorLevel::Warning,
                        ),
                    },
                    Ok(None) => {}
                    Err(e) => self.errors.trigger(format!("{e:#}"), ErrorLevel::Warning),
                }
            }
        }

        if let Some(callback) = callback {
            if let Some(object) = callback.await {
                return self.set(key, object, cache, ttl).await.map(Some);
            }
        }
        Ok(None)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instance>> {
        self.instances.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn validate_key(key: &str) -> Result<(), KernelError> {
    if KEY_RE.is_match(key) {
        Ok(())
    } else {
        Err(KernelError::InvalidArgument("Invalid memory object key".into()))
    }
}

/// Lookup of one typed object: run-time memory first, then the cache when
/// opted in, then the fetch callback.
pub struct Query<'a, T> {
    memory: &'a Memory,
    key: String,
    cache: bool,
    ttl: u64,
    _type: PhantomData<fn() -> T>,
}

impl<T> Query<'_, T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Also look up and store the object in the cache. `0` means no expiry.
    pub fn cache(mut self, ttl: u64) -> Self {
        self.cache = true;
        self.ttl = ttl;
        self
    }

    pub async fn fetch<F, Fut>(self, callback: F) -> Result<Option<Arc<T>>, KernelError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        self.memory
            .get(&self.key, self.cache, self.ttl, Some(callback()))
            .await
    }

    pub async fn get(self) -> Result<Option<Arc<T>>, KernelError> {
        self.memory
            .get(&self.key, self.cache, self.ttl, None::<std::future::Ready<Option<T>>>)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::path::Path;

    #[derive(Default)]
    struct MapCache(Mutex<HashMap<String, String>>);

    #[async_trait]
    impl Cache for MapCache {
        async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }
        async fn set(&self, key: &str, value: &str, _ttl: u64) -> anyhow::Result<()> {
            self.0.lock().unwrap().insert(key.into(), value.into());
            Ok(())
        }
        async fn delete(&self, key: &str) -> anyhow::Result<bool> {
            Ok(self.0.lock().unwrap().remove(key).is_some())
        }
        async fn has(&self, key: &str) -> anyhow::Result<bool> {
            Ok(self.0.lock().unwrap().contains_key(key))
        }
        async fn ping(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Rates {
        usd: u32,
    }

    fn memory() -> Memory {
        Memory::new(ErrorHandler::new(true, Path::new("/")))
    }

    #[tokio::test]
    async fn callback_result_is_memoised() {
        let memory = memory();
        let first = memory
            .query::<Rates>("fx.rates")
            .fetch(|| async { Some(Rates { usd: 3 }) })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.usd, 3);

        let second = memory
            .query::<Rates>("fx.rates")
            .fetch(|| async { Some(Rates { usd: 99 }) })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.usd, 3);

        memory.flush();
        assert!(memory.query::<Rates>("fx.rates").get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn type_mismatch_misses() {
        let memory = memory();
        memory.set("shared:key", 5u64, false, 0).await.unwrap();
        assert!(memory.query::<Rates>("shared:key").get().await.unwrap().is_none());
        assert_eq!(*memory.query::<u64>("shared:key").get().await.unwrap().unwrap(), 5);
    }

    #[tokio::test]
    async fn cache_is_opt_in() {
        let cache = Arc::new(MapCache::default());
        let memory = memory().caching(cache.clone());
        memory
            .query::<Rates>("not-cached")
            .fetch(|| async { Some(Rates { usd: 1 }) })
            .await
            .unwrap();
        assert!(!cache.has("not-cached").await.unwrap());

        memory
            .query::<Rates>("cached")
            .cache(60)
            .fetch(|| async { Some(Rates { usd: 2 }) })
            .await
            .unwrap();
        assert_eq!(cache.get("cached").await.unwrap().as_deref(), Some("{\"usd\":2}"));

        memory.flush();
        let restored = memory.query::<Rates>("cached").cache(60).get().await.unwrap();
        assert_eq!(restored.as_deref(), Some(&Rates { usd: 2 }));
    }

    #[tokio::test]
    async fn new_runs_see_cache_expiry() {
        let cache = Arc::new(MapCache::default());
        let first = memory().caching(cache.clone());
        let rates = first
            .query::<Rates>("fx.rates")
            .cache(1)
            .fetch(|| async { Some(Rates { usd: 1 }) })
            .await
            .unwrap();
        assert_eq!(rates.as_deref(), Some(&Rates { usd: 1 }));

        cache.delete("fx.rates").await.unwrap();
        let next = memory().caching(cache.clone());
        let rates = next
            .query::<Rates>("fx.rates")
            .cache(1)
            .fetch(|| async { Some(Rates { usd: 2 }) })
            .await
            .unwrap();
        assert_eq!(rates.as_deref(), Some(&Rates { usd: 2 }));
    }

    #[tokio::test]
    async fn undecodable_cache_entry_warns() {
        let cache = Arc::new(MapCache::default());
        cache.set("broken", "{", 0).await.unwrap();
        let errors = ErrorHandler::new(true, Path::new("/"));
        let memory = Memory::new(errors.clone()).caching(cache);
        assert!(memory.query::<Rates>("broken").cache(0).get().await.unwrap().is_none());
        assert_eq!(errors.errors().triggered().len(), 1);
    }

    #[tokio::test]
    async fn rejects_bad_keys() {
        let memory = memory();
        let err = memory.query::<u8>("a b").get().await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid memory object key");
        assert!(memory.set("x", 1u8, false, 0).await.is_err());
    }
}
