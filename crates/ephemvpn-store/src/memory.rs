// In-process parameter store.
//
// Backs tests and `node --offline` runs. Writes are visible to every
// clone (shared `Arc<DashMap>`), and the store can be switched into an
// "unreachable" mode to exercise the `Unavailable` paths.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::trace;

use crate::error::Error;
use crate::store::{Confidentiality, ParameterStore, PutOutcome};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    confidentiality: Confidentiality,
}

/// `DashMap`-backed [`ParameterStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    params: Arc<DashMap<String, StoredValue>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with plain parameters.
    pub fn with_params<I, K, V>(params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        for (k, v) in params {
            store.params.insert(
                k.into(),
                StoredValue {
                    value: v.into(),
                    confidentiality: Confidentiality::Plain,
                },
            );
        }
        store
    }

    /// Simulate the store becoming unreachable (or reachable again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// The confidentiality a parameter was written with, if present.
    pub fn confidentiality(&self, name: &str) -> Option<Confidentiality> {
        self.params.get(name).map(|v| v.confidentiality)
    }

    fn check(&self, name: &str) -> Result<(), Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::unavailable(name, "simulated outage"));
        }
        Ok(())
    }
}

#[async_trait]
impl ParameterStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<String, Error> {
        self.check(name)?;
        trace!(name, "memory get");
        self.params
            .get(name)
            .map(|v| v.value.clone())
            .ok_or_else(|| Error::NotFound {
                name: name.to_owned(),
            })
    }

    async fn put(
        &self,
        name: &str,
        value: &str,
        confidentiality: Confidentiality,
    ) -> Result<(), Error> {
        self.check(name)?;
        trace!(name, "memory put");
        self.params.insert(
            name.to_owned(),
            StoredValue {
                value: value.to_owned(),
                confidentiality,
            },
        );
        Ok(())
    }

    async fn put_if_absent(
        &self,
        name: &str,
        value: &str,
        confidentiality: Confidentiality,
    ) -> Result<PutOutcome, Error> {
        self.check(name)?;
        match self.params.entry(name.to_owned()) {
            Entry::Occupied(_) => Ok(PutOutcome::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(StoredValue {
                    value: value.to_owned(),
                    confidentiality,
                });
                Ok(PutOutcome::Written)
            }
        }
    }

    async fn list_names(&self, prefix: &str) -> Result<Vec<String>, Error> {
        self.check(prefix)?;
        let mut names: Vec<String> = self
            .params
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<(), Error> {
        self.check(name)?;
        self.params.remove(name);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get("/x/missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.get_optional("/x/missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_then_get() {
        let store = MemoryStore::new();
        store
            .put("/x/key", "value", Confidentiality::Secret)
            .await
            .unwrap();
        assert_eq!(store.get("/x/key").await.unwrap(), "value");
        assert_eq!(
            store.confidentiality("/x/key"),
            Some(Confidentiality::Secret)
        );
    }

    #[tokio::test]
    async fn put_if_absent_keeps_first_value() {
        let store = MemoryStore::new();
        let first = store
            .put_if_absent("/x/key", "one", Confidentiality::Plain)
            .await
            .unwrap();
        let second = store
            .put_if_absent("/x/key", "two", Confidentiality::Plain)
            .await
            .unwrap();
        assert_eq!(first, PutOutcome::Written);
        assert_eq!(second, PutOutcome::AlreadyExists);
        assert_eq!(store.get("/x/key").await.unwrap(), "one");
    }

    #[tokio::test]
    async fn binary_values_survive_text_store() {
        let store = MemoryStore::new();
        let payload = [0u8, 159, 146, 150, 255, b'\n'];
        store
            .put_binary("/x/bin", &payload, Confidentiality::Plain)
            .await
            .unwrap();
        assert_eq!(store.get("/x/bin").await.unwrap(), "AJ+Slv8K");
        assert_eq!(store.get_binary("/x/bin").await.unwrap(), payload);
    }

    #[tokio::test]
    async fn get_binary_rejects_garbage() {
        let store = MemoryStore::with_params([("/x/bin", "not base64!!")]);
        let err = store.get_binary("/x/bin").await.unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));
    }

    #[tokio::test]
    async fn list_names_filters_and_sorts() {
        let store = MemoryStore::with_params([
            ("/p/users/bob/status", "active"),
            ("/p/users/alice/status", "active"),
            ("/p/wg/server-public-key", "pk"),
        ]);
        let names = store.list_names("/p/users/").await.unwrap();
        assert_eq!(
            names,
            vec!["/p/users/alice/status", "/p/users/bob/status"]
        );
    }

    #[tokio::test]
    async fn outage_is_unavailable_not_missing() {
        let store = MemoryStore::with_params([("/x/key", "v")]);
        store.set_unavailable(true);
        let err = store.get("/x/key").await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(store.get_optional("/x/key").await.is_err());

        store.set_unavailable(false);
        assert_eq!(store.get("/x/key").await.unwrap(), "v");
    }

    #[tokio::test]
    async fn delete_missing_is_ok() {
        let store = MemoryStore::new();
        store.delete("/x/none").await.unwrap();
    }
}
