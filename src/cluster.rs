//! Cluster API access
//!
//! A thin typed layer over the Kubernetes API with the three-way error split
//! the reader and executor rely on: the object is missing (`NotFound`), the
//! object's kind is not served (`KindNotRegistered`), or anything else.

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{OperatorError, Result};

/// Anything the operator reads or writes through [`ClusterClient`].
pub trait ManagedResource:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> ManagedResource for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Name and namespace of one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub name: String,
    pub namespace: String,
}

impl ObjectKey {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Key of an already built object.
    pub fn of<K: ResourceExt>(obj: &K) -> Self {
        Self {
            name: obj.name_any(),
            namespace: obj.namespace().unwrap_or_else(|| "default".to_string()),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Cluster API collaborator.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch one object. Fails with `NotFound` or `KindNotRegistered` when absent.
    async fn get<K: ManagedResource>(&self, key: &ObjectKey) -> Result<K>;

    /// Create an object. An object that already exists counts as created.
    async fn create<K: ManagedResource>(&self, obj: &K) -> Result<()>;

    /// Replace an object. The object must carry its current resource version.
    async fn update<K: ManagedResource>(&self, obj: &K) -> Result<()>;

    /// Delete an object. An object that is already gone counts as deleted.
    async fn delete<K: ManagedResource>(&self, obj: &K) -> Result<()>;

    /// List objects in a namespace matching a label selector.
    async fn list<K: ManagedResource>(&self, namespace: &str, labels: &str) -> Result<Vec<K>>;
}

/// [`ClusterClient`] backed by a `kube::Client`.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Create a new cluster client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    fn api<K: ManagedResource>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Split a kube error into not-found, kind-not-registered, or a plain API error.
pub fn classify_kube_error(err: kube::Error, kind: &str, key: &ObjectKey) -> OperatorError {
    match &err {
        kube::Error::Api(resp) if resp.code == 404 => {
            if resp.reason == "NotFound"
                && !resp
                    .message
                    .contains("could not find the requested resource")
            {
                OperatorError::NotFound(format!("{} {}", kind, key))
            } else {
                OperatorError::KindNotRegistered(kind.to_string())
            }
        }
        _ => OperatorError::KubeApi(err.to_string()),
    }
}

fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 409)
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get<K: ManagedResource>(&self, key: &ObjectKey) -> Result<K> {
        let kind = K::kind(&()).to_string();
        self.api::<K>(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| classify_kube_error(e, &kind, key))
    }

    async fn create<K: ManagedResource>(&self, obj: &K) -> Result<()> {
        let kind = K::kind(&()).to_string();
        let key = ObjectKey::of(obj);
        match self
            .api::<K>(&key.namespace)
            .create(&PostParams::default(), obj)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_conflict(&e) => {
                info!(kind = %kind, object = %key, "Object already exists");
                Ok(())
            }
            Err(e) => Err(classify_kube_error(e, &kind, &key)),
        }
    }

    async fn update<K: ManagedResource>(&self, obj: &K) -> Result<()> {
        let kind = K::kind(&()).to_string();
        let key = ObjectKey::of(obj);
        self.api::<K>(&key.namespace)
            .replace(&key.name, &PostParams::default(), obj)
            .await
            .map(|_| ())
            .map_err(|e| classify_kube_error(e, &kind, &key))
    }

    async fn delete<K: ManagedResource>(&self, obj: &K) -> Result<()> {
        let kind = K::kind(&()).to_string();
        let key = ObjectKey::of(obj);
        match self
            .api::<K>(&key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => match classify_kube_error(e, &kind, &key) {
                OperatorError::NotFound(_) => {
                    debug!(kind = %kind, object = %key, "Object already deleted");
                    Ok(())
                }
                other => Err(other),
            },
        }
    }

    async fn list<K: ManagedResource>(&self, namespace: &str, labels: &str) -> Result<Vec<K>> {
        let params = kube::api::ListParams::default().labels(labels);
        let list = self.api::<K>(namespace).list(&params).await?;
        Ok(list.items)
    }
}

#[cfg(test)]
pub mod testing {
    //! In-memory [`ClusterClient`] for tests.

    use super::*;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;

    type StoreKey = (String, String, String);

    #[derive(Default)]
    pub struct FakeClusterClient {
        objects: Mutex<BTreeMap<StoreKey, serde_json::Value>>,
        unregistered: HashSet<String>,
        failing: HashSet<String>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeClusterClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every call for `kind` fail with `KindNotRegistered`.
        pub fn without_kind(mut self, kind: &str) -> Self {
            self.unregistered.insert(kind.to_string());
            self
        }

        /// Make every call for `kind` fail with a plain API error.
        pub fn failing_kind(mut self, kind: &str) -> Self {
            self.failing.insert(kind.to_string());
            self
        }

        pub fn insert<K: ManagedResource>(&self, obj: &K) {
            let key = ObjectKey::of(obj);
            self.objects.lock().unwrap().insert(
                (K::kind(&()).to_string(), key.namespace, key.name),
                serde_json::to_value(obj).unwrap(),
            );
        }

        pub fn stored<K: ManagedResource>(&self, key: &ObjectKey) -> Option<K> {
            self.objects
                .lock()
                .unwrap()
                .get(&(K::kind(&()).to_string(), key.namespace.clone(), key.name.clone()))
                .map(|v| serde_json::from_value(v.clone()).unwrap())
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn check_kind(&self, kind: &str) -> Result<()> {
            if self.unregistered.contains(kind) {
                return Err(OperatorError::KindNotRegistered(kind.to_string()));
            }
            if self.failing.contains(kind) {
                return Err(OperatorError::KubeApi(format!("{} unavailable", kind)));
            }
            Ok(())
        }

        fn record(&self, verb: &str, kind: &str, key: &ObjectKey) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {} {}", verb, kind, key.name));
        }
    }

    #[async_trait]
    impl ClusterClient for FakeClusterClient {
        async fn get<K: ManagedResource>(&self, key: &ObjectKey) -> Result<K> {
            let kind = K::kind(&()).to_string();
            self.record("get", &kind, key);
            self.check_kind(&kind)?;
            self.stored(key)
                .ok_or_else(|| OperatorError::NotFound(format!("{} {}", kind, key)))
        }

        async fn create<K: ManagedResource>(&self, obj: &K) -> Result<()> {
            let kind = K::kind(&()).to_string();
            let key = ObjectKey::of(obj);
            self.record("create", &kind, &key);
            self.check_kind(&kind)?;
            if self.stored::<K>(&key).is_none() {
                self.insert(obj);
            }
            Ok(())
        }

        async fn update<K: ManagedResource>(&self, obj: &K) -> Result<()> {
            let kind = K::kind(&()).to_string();
            let key = ObjectKey::of(obj);
            self.record("update", &kind, &key);
            self.check_kind(&kind)?;
            if self.stored::<K>(&key).is_none() {
                return Err(OperatorError::NotFound(format!("{} {}", kind, key)));
            }
            self.insert(obj);
            Ok(())
        }

        async fn delete<K: ManagedResource>(&self, obj: &K) -> Result<()> {
            let kind = K::kind(&()).to_string();
            let key = ObjectKey::of(obj);
            self.record("delete", &kind, &key);
            self.check_kind(&kind)?;
            self.objects
                .lock()
                .unwrap()
                .remove(&(kind, key.namespace, key.name));
            Ok(())
        }

        async fn list<K: ManagedResource>(&self, namespace: &str, _labels: &str) -> Result<Vec<K>> {
            let kind = K::kind(&()).to_string();
            self.check_kind(&kind)?;
            Ok(self
                .objects
                .lock()
                .unwrap()
                .iter()
                .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
                .map(|(_, v)| serde_json::from_value(v.clone()).unwrap())
                .collect())
        }
    }
}
