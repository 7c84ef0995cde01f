//! installplan-operator kubehub: resource client over kube-rs and the
//! Subscription watch stream.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use ipo_core::{ClientError, ResourceChange, ResourceKind, OLM_GROUP, OLM_VERSION};
use kube::{
    api::{Api, Patch, PatchParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    runtime::watcher::{self, Event},
    Client, ResourceExt,
};
use tracing::{debug, info};

#[cfg(feature = "fake")]
pub mod fake;

const FIELD_MANAGER: &str = "installplan-operator";

/// Capability to read, write and watch the OLM objects the operator manages.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn get(&self, kind: ResourceKind, name: &str, namespace: &str) -> Result<DynamicObject, ClientError>;

    /// Write `object` back (namespace scoped).
    async fn patch(&self, kind: ResourceKind, object: &DynamicObject, namespace: &str) -> Result<DynamicObject, ClientError>;

    /// Long-lived change stream over all objects of `kind`. Dropping the stream
    /// cancels the watch.
    fn watch(&self, kind: ResourceKind) -> BoxStream<'static, Result<ResourceChange, ClientError>>;
}

/// `ApiResource` for one of the OLM kinds, without a discovery round-trip.
pub fn api_resource(kind: ResourceKind) -> ApiResource {
    let gvk = GroupVersionKind::gvk(OLM_GROUP, OLM_VERSION, kind.kind());
    ApiResource::from_gvk_with_plural(&gvk, kind.plural())
}

/// Map a kube error onto the operator's error taxonomy.
pub fn classify(err: kube::Error) -> ClientError {
    match err {
        kube::Error::Api(resp) => match resp.code {
            404 => ClientError::NotFound(resp.message),
            401 | 403 => ClientError::Unauthorized(resp.message),
            code => ClientError::Api(format!("{} ({}): {}", resp.reason, code, resp.message)),
        },
        other => ClientError::Api(other.to_string()),
    }
}

fn change_from(ev: Event<DynamicObject>) -> ResourceChange {
    match ev {
        Event::Applied(o) => ResourceChange::Applied { namespace: o.namespace(), name: o.name_any() },
        Event::Deleted(o) => ResourceChange::Deleted { namespace: o.namespace(), name: o.name_any() },
        Event::Restarted(list) => {
            debug!(count = list.len(), "watch restart");
            ResourceChange::Restarted { count: list.len() }
        }
    }
}

/// kube-rs backed client. Resource handles are resolved once at construction.
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
    subscriptions: ApiResource,
    install_plans: ApiResource,
}

impl KubeClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            subscriptions: api_resource(ResourceKind::Subscription),
            install_plans: api_resource(ResourceKind::InstallPlan),
        }
    }

    /// In-cluster config when available, otherwise the local kubeconfig.
    pub async fn try_default() -> Result<Self, ClientError> {
        let client = Client::try_default().await.map_err(classify)?;
        info!("kube client ready");
        Ok(Self::new(client))
    }

    fn resource(&self, kind: ResourceKind) -> &ApiResource {
        match kind {
            ResourceKind::Subscription => &self.subscriptions,
            ResourceKind::InstallPlan => &self.install_plans,
        }
    }

    fn namespaced(&self, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, self.resource(kind))
    }
}

#[async_trait]
impl ResourceClient for KubeClient {
    async fn get(&self, kind: ResourceKind, name: &str, namespace: &str) -> Result<DynamicObject, ClientError> {
        self.namespaced(kind, namespace).get(name).await.map_err(classify)
    }

    async fn patch(&self, kind: ResourceKind, object: &DynamicObject, namespace: &str) -> Result<DynamicObject, ClientError> {
        let name = object
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ClientError::Api(format!("{} object missing metadata.name", kind)))?;
        let pp = PatchParams { field_manager: Some(FIELD_MANAGER.to_string()), ..Default::default() };
        self.namespaced(kind, namespace)
            .patch(name, &pp, &Patch::Merge(object))
            .await
            .map_err(classify)
    }

    fn watch(&self, kind: ResourceKind) -> BoxStream<'static, Result<ResourceChange, ClientError>> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), self.resource(kind));
        info!(gvk = %kind.gvk_key(), "watcher started");
        watcher::watcher(api, watcher::Config::default())
            .map(|res| res.map(change_from).map_err(|e| ClientError::Api(e.to_string())))
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_err(code: u16, message: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: "fake reason".to_string(),
            code,
        })
    }

    #[test]
    fn classify_maps_status_codes() {
        assert_eq!(
            classify(api_err(404, "subscriptions \"x\" not found")),
            ClientError::NotFound("subscriptions \"x\" not found".to_string())
        );
        assert!(matches!(classify(api_err(403, "forbidden")), ClientError::Unauthorized(_)));
        assert!(matches!(classify(api_err(401, "who are you")), ClientError::Unauthorized(_)));
        match classify(api_err(400, "bad request")) {
            ClientError::Api(msg) => assert!(msg.contains("400") && msg.contains("bad request"), "msg={}", msg),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn api_resource_uses_olm_group() {
        let ar = api_resource(ResourceKind::InstallPlan);
        assert_eq!(ar.group, "operators.coreos.com");
        assert_eq!(ar.version, "v1alpha1");
        assert_eq!(ar.api_version, "operators.coreos.com/v1alpha1");
        assert_eq!(ar.kind, "InstallPlan");
        assert_eq!(ar.plural, "installplans");
        assert_eq!(api_resource(ResourceKind::Subscription).plural, "subscriptions");
    }

    #[test]
    fn watch_events_become_changes() {
        let ar = api_resource(ResourceKind::Subscription);
        let obj = DynamicObject::new("etcd", &ar).within("operators");
        assert_eq!(
            change_from(Event::Applied(obj.clone())),
            ResourceChange::Applied { namespace: Some("operators".to_string()), name: "etcd".to_string() }
        );
        assert_eq!(
            change_from(Event::Deleted(obj.clone())),
            ResourceChange::Deleted { namespace: Some("operators".to_string()), name: "etcd".to_string() }
        );
        assert_eq!(change_from(Event::Restarted(vec![obj.clone(), obj])), ResourceChange::Restarted { count: 2 });
    }
}
