//! In-memory `ResourceClient` recording every call.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use ipo_core::{ClientError, ResourceChange, ResourceKind};
use kube::core::DynamicObject;
use serde_json::json;

use crate::{api_resource, ResourceClient};

type Key = (ResourceKind, String, String);

/// A recorded `patch` call.
#[derive(Debug, Clone)]
pub struct PatchCall {
    pub kind: ResourceKind,
    pub namespace: String,
    pub object: DynamicObject,
}

#[derive(Default)]
pub struct FakeClient {
    objects: Mutex<HashMap<Key, DynamicObject>>,
    get_failures: Mutex<HashMap<ResourceKind, ClientError>>,
    patch_failure: Mutex<Option<ClientError>>,
    gets: Mutex<Vec<Key>>,
    patches: Mutex<Vec<PatchCall>>,
    watch_items: Mutex<Vec<Result<ResourceChange, ClientError>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscription pointing at `plan` (or at nothing when `None`).
    pub fn with_subscription(self, namespace: &str, name: &str, plan: Option<&str>) -> Self {
        let status = match plan {
            Some(plan) => json!({ "installPlanRef": { "name": plan } }),
            None => json!({}),
        };
        let obj = DynamicObject::new(name, &api_resource(ResourceKind::Subscription))
            .within(namespace)
            .data(json!({ "status": status }));
        self.insert(ResourceKind::Subscription, namespace, name, obj)
    }

    pub fn with_install_plan(self, namespace: &str, name: &str, approved: bool, csv_names: &[&str]) -> Self {
        let obj = DynamicObject::new(name, &api_resource(ResourceKind::InstallPlan))
            .within(namespace)
            .data(json!({
                "spec": {
                    "approved": approved,
                    "clusterServiceVersionNames": csv_names,
                }
            }));
        self.insert(ResourceKind::InstallPlan, namespace, name, obj)
    }

    /// Every `get` of `kind` fails with `err`.
    pub fn failing_get(self, kind: ResourceKind, err: ClientError) -> Self {
        lock(&self.get_failures).insert(kind, err);
        self
    }

    pub fn failing_patch(self, err: ClientError) -> Self {
        *lock(&self.patch_failure) = Some(err);
        self
    }

    /// Items yielded (once) by the next `watch` call; the stream then ends.
    pub fn with_watch_items(self, items: Vec<Result<ResourceChange, ClientError>>) -> Self {
        *lock(&self.watch_items) = items;
        self
    }

    fn insert(self, kind: ResourceKind, namespace: &str, name: &str, obj: DynamicObject) -> Self {
        lock(&self.objects).insert((kind, namespace.to_string(), name.to_string()), obj);
        self
    }

    pub fn object(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<DynamicObject> {
        lock(&self.objects).get(&(kind, namespace.to_string(), name.to_string())).cloned()
    }

    pub fn gets(&self) -> Vec<(ResourceKind, String, String)> {
        lock(&self.gets).clone()
    }

    pub fn patches(&self) -> Vec<PatchCall> {
        lock(&self.patches).clone()
    }
}

#[async_trait]
impl ResourceClient for FakeClient {
    async fn get(&self, kind: ResourceKind, name: &str, namespace: &str) -> Result<DynamicObject, ClientError> {
        let key = (kind, namespace.to_string(), name.to_string());
        lock(&self.gets).push(key.clone());
        if let Some(err) = lock(&self.get_failures).get(&kind) {
            return Err(err.clone());
        }
        lock(&self.objects)
            .get(&key)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("{} {}/{} not found", kind, namespace, name)))
    }

    async fn patch(&self, kind: ResourceKind, object: &DynamicObject, namespace: &str) -> Result<DynamicObject, ClientError> {
        lock(&self.patches).push(PatchCall { kind, namespace: namespace.to_string(), object: object.clone() });
        if let Some(err) = lock(&self.patch_failure).clone() {
            return Err(err);
        }
        let name = object.metadata.name.clone().unwrap_or_default();
        lock(&self.objects).insert((kind, namespace.to_string(), name), object.clone());
        Ok(object.clone())
    }

    fn watch(&self, _kind: ResourceKind) -> BoxStream<'static, Result<ResourceChange, ClientError>> {
        let items = std::mem::take(&mut *lock(&self.watch_items));
        futures::stream::iter(items).boxed()
    }
}
