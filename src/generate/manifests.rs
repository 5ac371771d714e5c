//! Kubernetes manifests for running a Spin application on AKS.
use std::collections::BTreeMap;
use serde::Serialize;
use super::k8s::*;
use super::{component_sources, Error};
use crate::spin::Manifest;

const YAML_SEPARATOR: &str = "---\n";

/// Prefix Spin uses to read application variables from the environment.
const ENV_PREFIX: &str = "SPIN_CONFIG_";
const SECRET_KEY: &str = "secretKey";
const SPC_NAME: &str = "spin-aks-spc";
const SPC_VOLUME_NAME: &str = "spin-aks-spc-volume";
const CSI_DRIVER: &str = "secrets-store.csi.k8s.io";

const RUNTIME_CLASS_NAME: &str = "wasmtime-spin-v1";
const RUNTIME_CLASS_HANDLER: &str = "spin";
const RUNTIME_CLASS_NODE_LABEL: &str = "kubernetes.azure.com/wasmtime-spin-v0-5-1";

const REPLICAS: u32 = 3;
const HTTP_PORT: u16 = 80;

/// Managed identity of the cluster, used to read from the key vault.
#[derive(Debug, Clone, Default)]
pub struct ClusterIdentity {
    pub principal_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct KeyVault {
    pub name: String,
    pub tenant_id: String,
}

/// Inputs resolved outside of the manifest.
#[derive(Debug, Clone, Default)]
pub struct Opts {
    pub image: String,
    pub cluster_identity: ClusterIdentity,
    pub key_vault: KeyVault,
    /// UID placed in the secret provider class' owner reference.
    /// Not assigned until the deployment exists in the cluster, so any stable value works.
    pub owner_uid: String,
}

/// One object in the secret provider's `objects` parameter.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyVaultObject<'a> {
    object_name: &'a str,
    object_type: &'a str,
    object_version: &'a str,
}

#[derive(Serialize)]
struct KeyVaultObjects {
    array: Vec<String>,
}

fn annotations() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "spin.kubernetes.azure.com/created-by".to_string(),
        "aks-spin-plugin".to_string(),
    )])
}

fn meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: name.to_string(),
        namespace: namespace.map(str::to_string),
        annotations: annotations(),
        ..Default::default()
    }
}

/// Render all objects needed to run `manifest` as a multi document YAML string.
///
/// Objects are emitted in apply order: namespace, runtime class, deployment,
/// secret provider class (only with secret variables), service.
pub fn generate(manifest: &Manifest, opts: &Opts) -> Result<String, Error> {
    component_sources(manifest)?;

    let name = manifest.name.trim();
    if name.is_empty() {
        return Err(Error::EmptyName);
    }

    let namespace = Object::new(meta(name, None), Namespace {});
    let runtime_class = Object::new(
        meta(RUNTIME_CLASS_NAME, None),
        RuntimeClass {
            handler: RUNTIME_CLASS_HANDLER.to_string(),
            scheduling: Scheduling {
                node_selector: BTreeMap::from([(
                    RUNTIME_CLASS_NODE_LABEL.to_string(),
                    "true".to_string(),
                )]),
            },
        },
    );
    let app_labels = BTreeMap::from([("app".to_string(), name.to_string())]);

    let mut env = Vec::with_capacity(manifest.variables.len());
    let mut secret_objects = Vec::new();
    let mut key_vault_objects = Vec::new();
    for (key, variable) in &manifest.variables {
        if !variable.secret {
            env.push(EnvVar {
                name: format!("{ENV_PREFIX}{key}"),
                value: Some(variable.default.clone()),
                value_from: None,
            });
            continue;
        }

        env.push(EnvVar {
            name: format!("{ENV_PREFIX}{key}"),
            value: None,
            value_from: Some(EnvVarSource {
                secret_key_ref: SecretKeySelector {
                    name: key.clone(),
                    key: SECRET_KEY.to_string(),
                },
            }),
        });
        secret_objects.push(SecretObject {
            secret_name: key.clone(),
            secret_type: "Opaque".to_string(),
            data: vec![SecretObjectData {
                object_name: key.clone(),
                key: SECRET_KEY.to_string(),
            }],
        });
        key_vault_objects.push(serde_json::to_string(&KeyVaultObject {
            object_name: key,
            object_type: "secret",
            object_version: "",
        })?);
    }
    let has_secrets = !secret_objects.is_empty();

    let mut container = Container {
        name: name.to_string(),
        image: opts.image.clone(),
        command: vec!["/".to_string()],
        env,
        volume_mounts: Vec::new(),
    };
    let mut volumes = Vec::new();
    if has_secrets {
        // Secrets are consumed through the environment, the mount only makes the driver sync them.
        container.volume_mounts.push(VolumeMount {
            name: SPC_VOLUME_NAME.to_string(),
            read_only: true,
            mount_path: "/mnt/secrets".to_string(),
        });
        volumes.push(Volume {
            name: SPC_VOLUME_NAME.to_string(),
            csi: CsiVolumeSource {
                driver: CSI_DRIVER.to_string(),
                read_only: true,
                volume_attributes: BTreeMap::from([(
                    "secretProviderClass".to_string(),
                    SPC_NAME.to_string(),
                )]),
            },
        });
    }

    let deployment = Object::new(
        meta(name, Some(name)),
        Deployment {
            spec: DeploymentSpec {
                replicas: REPLICAS,
                selector: LabelSelector {
                    match_labels: app_labels.clone(),
                },
                template: PodTemplateSpec {
                    metadata: PodMeta {
                        labels: app_labels.clone(),
                        annotations: annotations(),
                    },
                    spec: PodSpec {
                        runtime_class_name: RUNTIME_CLASS_NAME.to_string(),
                        containers: vec![container],
                        volumes,
                    },
                },
            },
        },
    );

    let secret_provider_class = if has_secrets {
        Some(secret_provider_class(
            name,
            &deployment,
            opts,
            secret_objects,
            key_vault_objects,
        )?)
    } else {
        None
    };

    let service = Object::new(
        meta(name, Some(name)),
        Service {
            spec: ServiceSpec {
                selector: app_labels,
                service_type: "LoadBalancer".to_string(),
                ports: vec![ServicePort {
                    protocol: "TCP".to_string(),
                    port: HTTP_PORT,
                    target_port: HTTP_PORT,
                }],
            },
        },
    );

    let mut documents = vec![
        serde_yaml::to_string(&namespace)?,
        serde_yaml::to_string(&runtime_class)?,
        serde_yaml::to_string(&deployment)?,
    ];
    if let Some(spc) = &secret_provider_class {
        documents.push(serde_yaml::to_string(spc)?);
    }
    documents.push(serde_yaml::to_string(&service)?);

    Ok(documents.join(YAML_SEPARATOR))
}

/// See <https://learn.microsoft.com/en-us/azure/aks/csi-secrets-store-identity-access#access-with-a-user-assigned-managed-identity>.
fn secret_provider_class(
    namespace: &str,
    owner: &Object<Deployment>,
    opts: &Opts,
    secret_objects: Vec<SecretObject>,
    key_vault_objects: Vec<String>,
) -> Result<Object<SecretProviderClass>, Error> {
    for (field, value) in [
        ("key vault name", &opts.key_vault.name),
        ("tenant id", &opts.key_vault.tenant_id),
        ("cluster identity", &opts.cluster_identity.principal_id),
    ] {
        if value.is_empty() {
            return Err(Error::MissingKeyVault { field });
        }
    }

    let objects = serde_json::to_string(&KeyVaultObjects {
        array: key_vault_objects,
    })?;

    let mut metadata = meta(SPC_NAME, Some(namespace));
    metadata.owner_references = vec![owner.controller_reference(&opts.owner_uid)];

    Ok(Object::new(
        metadata,
        SecretProviderClass {
            spec: SecretProviderClassSpec {
                provider: "azure".to_string(),
                secret_objects,
                parameters: BTreeMap::from([
                    ("keyvaultName".to_string(), opts.key_vault.name.clone()),
                    ("useVMManagedIdentity".to_string(), "true".to_string()),
                    (
                        "userAssignedIdentityID".to_string(),
                        opts.cluster_identity.principal_id.clone(),
                    ),
                    ("tenantId".to_string(), opts.key_vault.tenant_id.clone()),
                    ("objects".to_string(), objects),
                ]),
            },
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    fn documents(output: &str) -> Vec<Value> {
        output
            .split(YAML_SEPARATOR)
            .map(|doc| serde_yaml::from_str(doc).unwrap())
            .collect()
    }

    fn kinds(docs: &[Value]) -> Vec<&str> {
        docs.iter().map(|d| d["kind"].as_str().unwrap()).collect()
    }

    fn opts() -> Opts {
        Opts {
            image: "registry/hello:latest".into(),
            cluster_identity: ClusterIdentity {
                principal_id: "00000000-1111".into(),
            },
            key_vault: KeyVault {
                name: "hello-kv".into(),
                tenant_id: "tenant".into(),
            },
            owner_uid: "uid".into(),
        }
    }

    const HELLO: &str = r#"
name = "hello"
[variables]
foo = { default = "bar" }
[[component]]
id = "c1"
source = "app.wasm"
"#;

    const WITH_SECRETS: &str = r#"
name = "hello"
[variables]
foo = { default = "bar" }
password = { secret = true, required = true }
token = { secret = true }
[[component]]
id = "c1"
source = "app.wasm"
"#;

    #[test]
    fn hello_world() {
        let manifest = Manifest::parse(HELLO).unwrap();
        let out = generate(&manifest, &Opts {
            image: "registry/hello:latest".into(),
            ..Default::default()
        })
        .unwrap();
        let docs = documents(&out);
        assert_eq!(kinds(&docs), vec!["Namespace", "RuntimeClass", "Deployment", "Service"]);

        assert_eq!(docs[0]["metadata"]["name"], "hello");
        assert_eq!(docs[1]["handler"], "spin");
        assert_eq!(
            docs[1]["scheduling"]["nodeSelector"][RUNTIME_CLASS_NODE_LABEL],
            "true"
        );

        let deployment = &docs[2];
        assert_eq!(deployment["metadata"]["namespace"], "hello");
        assert_eq!(deployment["spec"]["replicas"], 3);
        assert_eq!(deployment["spec"]["selector"]["matchLabels"]["app"], "hello");
        let pod = &deployment["spec"]["template"];
        assert_eq!(pod["metadata"]["labels"]["app"], "hello");
        assert_eq!(pod["spec"]["runtimeClassName"], RUNTIME_CLASS_NAME);
        assert!(pod["spec"].get("volumes").is_none());
        let containers = pod["spec"]["containers"].as_sequence().unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0]["name"], "hello");
        assert_eq!(containers[0]["image"], "registry/hello:latest");
        assert!(containers[0].get("volumeMounts").is_none());
        let env = containers[0]["env"].as_sequence().unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env[0]["name"], "SPIN_CONFIG_foo");
        assert_eq!(env[0]["value"], "bar");

        let service = &docs[3];
        assert_eq!(service["metadata"]["namespace"], "hello");
        assert_eq!(service["spec"]["selector"]["app"], "hello");
        assert_eq!(service["spec"]["type"], "LoadBalancer");
        assert_eq!(service["spec"]["ports"][0]["port"], 80);
        assert_eq!(service["spec"]["ports"][0]["targetPort"], 80);
    }

    #[test]
    fn secrets_produce_secret_provider_class() {
        let manifest = Manifest::parse(WITH_SECRETS).unwrap();
        let docs = documents(&generate(&manifest, &opts()).unwrap());
        assert_eq!(
            kinds(&docs),
            vec!["Namespace", "RuntimeClass", "Deployment", "SecretProviderClass", "Service"]
        );

        let pod = &docs[2]["spec"]["template"]["spec"];
        let container = &pod["containers"][0];
        let mounts = container["volumeMounts"].as_sequence().unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0]["name"], pod["volumes"][0]["name"]);
        assert_eq!(pod["volumes"][0]["csi"]["driver"], CSI_DRIVER);
        assert_eq!(pod["volumes"][0]["csi"]["volumeAttributes"]["secretProviderClass"], SPC_NAME);

        let env = container["env"].as_sequence().unwrap();
        assert_eq!(env.len(), 3);
        assert_eq!(env[1]["name"], "SPIN_CONFIG_password");
        assert_eq!(env[1]["valueFrom"]["secretKeyRef"]["name"], "password");
        assert_eq!(env[1]["valueFrom"]["secretKeyRef"]["key"], SECRET_KEY);
        assert!(env[1].get("value").is_none());

        let spc = &docs[3];
        assert_eq!(spc["metadata"]["name"], SPC_NAME);
        assert_eq!(spc["metadata"]["namespace"], "hello");
        let owner = &spc["metadata"]["ownerReferences"][0];
        assert_eq!(owner["apiVersion"], "apps/v1");
        assert_eq!(owner["kind"], "Deployment");
        assert_eq!(owner["name"], docs[2]["metadata"]["name"]);
        assert_eq!(owner["uid"], "uid");
        assert_eq!(owner["controller"], true);

        let params = &spc["spec"]["parameters"];
        assert_eq!(params["keyvaultName"], "hello-kv");
        assert_eq!(params["tenantId"], "tenant");
        assert_eq!(params["userAssignedIdentityID"], "00000000-1111");
        let objects: serde_json::Value =
            serde_json::from_str(params["objects"].as_str().unwrap()).unwrap();
        let array = objects["array"].as_array().unwrap();
        assert_eq!(array.len(), 2);
        let first: serde_json::Value = serde_json::from_str(array[0].as_str().unwrap()).unwrap();
        assert_eq!(first["objectName"], "password");
        assert_eq!(first["objectType"], "secret");
        assert_eq!(spc["spec"]["secretObjects"].as_sequence().unwrap().len(), 2);
    }

    #[test]
    fn secrets_without_key_vault() {
        let manifest = Manifest::parse(WITH_SECRETS).unwrap();
        let mut no_vault = opts();
        no_vault.key_vault.name.clear();
        let err = generate(&manifest, &no_vault).unwrap_err();
        assert!(matches!(err, Error::MissingKeyVault { field: "key vault name" }));

        let mut no_tenant = opts();
        no_tenant.key_vault.tenant_id.clear();
        let err = generate(&manifest, &no_tenant).unwrap_err();
        assert!(matches!(err, Error::MissingKeyVault { field: "tenant id" }));

        let mut no_identity = opts();
        no_identity.cluster_identity.principal_id.clear();
        let err = generate(&manifest, &no_identity).unwrap_err();
        assert!(matches!(err, Error::MissingKeyVault { field: "cluster identity" }));
    }

    #[test]
    fn no_key_vault_needed_without_secrets() {
        let manifest = Manifest::parse(HELLO).unwrap();
        assert!(generate(&manifest, &Opts::default()).is_ok());
    }

    #[test]
    fn url_source_rejected() {
        let manifest = Manifest::parse(
            "name = \"hello\"\n[[component]]\nid = \"remote\"\nsource = { url = \"h.wasm\", digest = \"d\" }\n",
        )
        .unwrap();
        let err = generate(&manifest, &opts()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedSourceKind { component } if component == "remote"));
    }

    #[test]
    fn files_rejected() {
        let manifest = Manifest::parse(
            "name = \"hello\"\n[[component]]\nid = \"c1\"\nsource = \"a.wasm\"\nfiles = { source = \"s\", destination = \"d\" }\n",
        )
        .unwrap();
        let err = generate(&manifest, &opts()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFiles { component } if component == "c1"));
    }

    #[test]
    fn empty_name() {
        let manifest = Manifest::parse("name = \"  \"\n[[component]]\nsource = \"a.wasm\"\n").unwrap();
        assert!(matches!(generate(&manifest, &opts()), Err(Error::EmptyName)));
    }

    #[test]
    fn output_is_deterministic() {
        let manifest = Manifest::parse(WITH_SECRETS).unwrap();
        let first = generate(&manifest, &opts()).unwrap();
        let second = generate(&manifest, &opts()).unwrap();
        assert_eq!(first, second);
    }
}
