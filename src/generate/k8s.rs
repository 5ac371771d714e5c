//! Subset of Kubernetes object definitions needed for the generated manifests.
//! Only the fields we actually emit are modelled.
use std::collections::BTreeMap;
use serde::Serialize;

/// Static type information of an object kind.
pub trait Kind {
    const API_VERSION: &'static str;
    const KIND: &'static str;
}

/// A top level Kubernetes object. The kind specific fields are flattened
/// next to `apiVersion`, `kind` and `metadata`.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Object<S> {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    #[serde(flatten)]
    pub body: S,
}

impl<S: Kind> Object<S> {
    pub fn new(metadata: ObjectMeta, body: S) -> Self {
        Self {
            api_version: S::API_VERSION,
            kind: S::KIND,
            metadata,
            body,
        }
    }

    /// Reference to this object as its controller. The UID is assigned by the API
    /// server once the object exists, so the caller has to supply one.
    pub fn controller_reference(&self, uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: self.api_version,
            kind: self.kind,
            name: self.metadata.name.clone(),
            uid: uid.to_string(),
            controller: true,
        }
    }
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub name: String,
    pub uid: String,
    pub controller: bool,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct Namespace {}

impl Kind for Namespace {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "Namespace";
}

#[derive(Serialize, Debug, Clone)]
pub struct RuntimeClass {
    pub handler: String,
    pub scheduling: Scheduling,
}

impl Kind for RuntimeClass {
    const API_VERSION: &'static str = "node.k8s.io/v1";
    const KIND: &'static str = "RuntimeClass";
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Scheduling {
    pub node_selector: BTreeMap<String, String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct Deployment {
    pub spec: DeploymentSpec,
}

impl Kind for Deployment {
    const API_VERSION: &'static str = "apps/v1";
    const KIND: &'static str = "Deployment";
}

#[derive(Serialize, Debug, Clone)]
pub struct DeploymentSpec {
    pub replicas: u32,
    pub selector: LabelSelector,
    pub template: PodTemplateSpec,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct PodTemplateSpec {
    pub metadata: PodMeta,
    pub spec: PodSpec,
}

#[derive(Serialize, Debug, Clone)]
pub struct PodMeta {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    pub runtime_class_name: String,
    pub containers: Vec<Container>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_from: Option<EnvVarSource>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSource {
    pub secret_key_ref: SecretKeySelector,
}

#[derive(Serialize, Debug, Clone)]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub read_only: bool,
    pub mount_path: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct Volume {
    pub name: String,
    pub csi: CsiVolumeSource,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CsiVolumeSource {
    pub driver: String,
    pub read_only: bool,
    pub volume_attributes: BTreeMap<String, String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct Service {
    pub spec: ServiceSpec,
}

impl Kind for Service {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "Service";
}

#[derive(Serialize, Debug, Clone)]
pub struct ServiceSpec {
    pub selector: BTreeMap<String, String>,
    #[serde(rename = "type")]
    pub service_type: String,
    pub ports: Vec<ServicePort>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    pub protocol: String,
    pub port: u16,
    pub target_port: u16,
}

/// Binds the secrets store CSI driver to an external secret provider.
#[derive(Serialize, Debug, Clone)]
pub struct SecretProviderClass {
    pub spec: SecretProviderClassSpec,
}

impl Kind for SecretProviderClass {
    const API_VERSION: &'static str = "secrets-store.csi.x-k8s.io/v1";
    const KIND: &'static str = "SecretProviderClass";
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SecretProviderClassSpec {
    pub provider: String,
    pub secret_objects: Vec<SecretObject>,
    pub parameters: BTreeMap<String, String>,
}

/// A Kubernetes secret synced from mounted provider objects.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SecretObject {
    pub secret_name: String,
    #[serde(rename = "type")]
    pub secret_type: String,
    pub data: Vec<SecretObjectData>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SecretObjectData {
    pub object_name: String,
    pub key: String,
}
