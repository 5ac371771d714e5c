use log::debug;
use serde::{Deserialize, Serialize};
use serde_inline_default::serde_inline_default;
use thiserror::Error;
use crate::generate::manifests::{ClusterIdentity, KeyVault as KeyVaultRef, Opts as ManifestOpts};
use Error::*;

/// Typically found next to the Spin manifest.
pub const DEFAULT_CONFIG_FILE: &str = "./aks-spin.toml";
pub const DEFAULT_DOCKERFILE: &str = "./Dockerfile";
pub const DEFAULT_K8S_RESOURCES: &str = "./manifests/manifests.yaml";

/// Environment variables with this prefix take precedence over the config file.
const ENV_PREFIX: &str = "AKS_SPIN_";

/// Image reference used until a container registry is configured.
const PLACEHOLDER_IMAGE: &str = "placeholderimagefornow:latest";

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {path}: {err}")]
    ReadFile {
        err: std::io::Error,
        path: String,
    },

    #[error("write {path}: {err}")]
    WriteFile {
        err: std::io::Error,
        path: String,
    },

    #[error("decode config: {0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("encode config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("spin manifest not set in config")]
    SpinManifestNotSet,
}

/// An aks-spin.toml file, describing where the application is deployed to.
#[serde_inline_default]
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct File {
    /// Path to the Spin manifest (spin.toml).
    #[serde(default)]
    pub spin_manifest: String,
    #[serde_inline_default(DEFAULT_DOCKERFILE.to_string())]
    pub dockerfile: String,
    /// Where the Kubernetes manifests are written to and applied from.
    #[serde_inline_default(DEFAULT_K8S_RESOURCES.to_string())]
    pub k8s_resources: String,
    #[serde(default)]
    pub runtime_config: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub cluster: Cluster,
    #[serde(default)]
    pub container_registry: ContainerRegistry,
    #[serde(default)]
    pub key_vault: KeyVault,
}

impl Default for File {
    fn default() -> Self {
        Self {
            spin_manifest: String::new(),
            dockerfile: DEFAULT_DOCKERFILE.to_string(),
            k8s_resources: DEFAULT_K8S_RESOURCES.to_string(),
            runtime_config: String::new(),
            tenant_id: String::new(),
            cluster: Default::default(),
            container_registry: Default::default(),
            key_vault: Default::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct Cluster {
    pub subscription: String,
    pub resource_group: String,
    pub name: String,
    /// Principal ID of the cluster's managed identity.
    pub principal_id: String,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct ContainerRegistry {
    pub subscription: String,
    pub resource_group: String,
    pub name: String,
    /// e.g. `myregistry.azurecr.io`
    pub login_server: String,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct KeyVault {
    pub subscription: String,
    pub resource_group: String,
    pub name: String,
}

impl File {
    pub fn parse(toml_string: &str) -> Result<Self, Error> {
        Ok(toml::from_str(toml_string)?)
    }

    pub fn load(path: &str) -> Result<Self, Error> {
        debug!("Loading config from {path}");
        Self::parse(
            &std::fs::read_to_string(path).map_err(|err| ReadFile {
                err,
                path: path.to_string(),
            })?
        )
    }

    /// Override values with the `AKS_SPIN_` prefixed variables returned by `lookup`,
    /// e.g. `AKS_SPIN_CLUSTER_PRINCIPAL_ID` for `cluster.principal_id`.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields = [
            ("SPIN_MANIFEST", &mut self.spin_manifest),
            ("DOCKERFILE", &mut self.dockerfile),
            ("K8S_RESOURCES", &mut self.k8s_resources),
            ("RUNTIME_CONFIG", &mut self.runtime_config),
            ("TENANT_ID", &mut self.tenant_id),
            ("CLUSTER_SUBSCRIPTION", &mut self.cluster.subscription),
            ("CLUSTER_RESOURCE_GROUP", &mut self.cluster.resource_group),
            ("CLUSTER_NAME", &mut self.cluster.name),
            ("CLUSTER_PRINCIPAL_ID", &mut self.cluster.principal_id),
            ("CONTAINER_REGISTRY_SUBSCRIPTION", &mut self.container_registry.subscription),
            ("CONTAINER_REGISTRY_RESOURCE_GROUP", &mut self.container_registry.resource_group),
            ("CONTAINER_REGISTRY_NAME", &mut self.container_registry.name),
            ("CONTAINER_REGISTRY_LOGIN_SERVER", &mut self.container_registry.login_server),
            ("KEY_VAULT_SUBSCRIPTION", &mut self.key_vault.subscription),
            ("KEY_VAULT_RESOURCE_GROUP", &mut self.key_vault.resource_group),
            ("KEY_VAULT_NAME", &mut self.key_vault.name),
        ];
        for (name, field) in fields {
            let variable = format!("{ENV_PREFIX}{name}");
            if let Some(value) = lookup(&variable) {
                debug!("Config value {variable} set from environment");
                *field = value;
            }
        }
        self
    }

    /// Write the config to `path`, creating parent directories as needed.
    pub fn write(&self, path: &str) -> Result<(), Error> {
        let write_error = |err| WriteFile {
            err,
            path: path.to_string(),
        };
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_error)?;
            }
        }
        std::fs::write(path, toml::to_string(self)?).map_err(write_error)
    }

    pub fn spin_manifest(&self) -> Result<&str, Error> {
        if self.spin_manifest.is_empty() {
            Err(SpinManifestNotSet)
        } else {
            Ok(&self.spin_manifest)
        }
    }

    /// Fully qualified image reference for `app`, or a placeholder when no registry is configured.
    pub fn image(&self, app: &str, tag: &str) -> String {
        if self.container_registry.login_server.is_empty() {
            PLACEHOLDER_IMAGE.to_string()
        } else {
            format!("{}/{}:{}", self.container_registry.login_server, app, tag)
        }
    }

    /// Manifest generation inputs resolved from this config.
    pub fn manifest_opts(&self, image: String, owner_uid: &str) -> ManifestOpts {
        ManifestOpts {
            image,
            cluster_identity: ClusterIdentity {
                principal_id: self.cluster.principal_id.clone(),
            },
            key_vault: KeyVaultRef {
                name: self.key_vault.name.clone(),
                tenant_id: self.tenant_id.clone(),
            },
            owner_uid: owner_uid.to_string(),
        }
    }
}
