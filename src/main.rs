//! Spin AKS
use std::path::{Path, PathBuf};
use clap::{Parser, Subcommand};
use log::{debug, error, info, warn, Level, LevelFilter};
use thiserror::Error;
use spin_aks::generate::{dockerfile, manifests};
use spin_aks::runtime_config::RuntimeConfig;
use spin_aks::spin::Manifest;
use spin_aks::{build, config, deploy, docker, generate, hasher, runtime_config, spin};
use crate::Error::*;

/// The deployment's UID is unknown until it is created, see [`manifests::Opts::owner_uid`].
const OWNER_UID_PLACEHOLDER: &str = "uid";
const DEFAULT_RUNTIME_CONFIG: &str = "./runtime-config.toml";

/// Guides you through deploying Spin applications to Azure Kubernetes Service.
#[derive(Parser, Debug)]
#[command(name = "spin aks", version, about, long_about = None)]
struct Cli {
    /// Print additional information typically useful for debugging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the spin aks config file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the config file describing where your application is deployed to.
    Init {
        /// Path to the application's spin.toml.
        #[arg(long)]
        spin_manifest: String,

        #[arg(long = "override")]
        overwrite: bool,
    },
    /// Generate files required to run your application on AKS.
    #[command(subcommand)]
    Scaffold(Scaffold),
    /// Build the Spin application to Wasm.
    Build,
    /// Build the application's container image and push it to the container registry.
    Push {
        /// Image tag. Defaults to a hash of the manifest and component sources.
        #[arg(long)]
        tag: Option<String>,
    },
    /// Apply the generated Kubernetes manifests to the cluster.
    Deploy,
}

#[derive(Debug, Subcommand)]
enum Scaffold {
    /// Generate a Dockerfile packaging the built application.
    Dockerfile {
        /// Destination Dockerfile path. Defaults to the configured Dockerfile.
        #[arg(short, long)]
        dest: Option<String>,

        /// Override existing files.
        #[arg(long = "override")]
        overwrite: bool,
    },
    /// Generate Kubernetes manifests.
    K8s {
        /// Destination YAML file path. Defaults to the configured Kubernetes resources.
        #[arg(short, long)]
        dest: Option<String>,

        /// Override existing files.
        #[arg(long = "override")]
        overwrite: bool,

        /// Image tag. Defaults to a hash of the manifest and component sources.
        #[arg(long)]
        tag: Option<String>,
    },
    /// Generate a Spin runtime config from the manifest's variables.
    RuntimeConfig {
        /// Destination TOML file path. Defaults to the configured runtime config.
        #[arg(short, long)]
        dest: Option<String>,

        /// Override existing files.
        #[arg(long = "override")]
        overwrite: bool,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration: {0}")]
    Config(#[from] config::Error),

    #[error("spin manifest: {0}")]
    Manifest(#[from] spin::Error),

    #[error("generate: {0}")]
    Generate(#[from] generate::Error),

    #[error("runtime config: {0}")]
    RuntimeConfig(#[from] runtime_config::Error),

    #[error("build error: {0}")]
    Build(#[from] build::Error),

    #[error("docker error: {0}")]
    Docker(#[from] docker::Error),

    #[error("deploy: {0}")]
    Deploy(#[from] deploy::Error),

    #[error("hash sources: {0}")]
    Hash(std::io::Error),

    #[error("container registry not set in config")]
    RegistryNotSet,

    #[error("file {0} already exists")]
    FileExists(String),

    #[error("write {path}: {err}")]
    WriteFile {
        err: std::io::Error,
        path: String,
    },
}

impl Error {
    /// Short explanation and fix for errors caused by missing setup rather than bugs.
    fn hint(&self) -> Option<String> {
        Some(match self {
            Config(config::Error::SpinManifestNotSet) => {
                "Spin manifest not set in config. Try running `spin aks init`.".into()
            }
            RegistryNotSet => {
                "Container registry not set in config. Add a container_registry.login_server and try again.".into()
            }
            Generate(generate::Error::EmptyName) => {
                "Name not set in spin manifest. Add a name to your spin manifest and try again.".into()
            }
            Generate(generate::Error::MissingKeyVault { .. }) => {
                "Secrets were detected but no key vault was found in config. Set key_vault.name, tenant_id and cluster.principal_id.".into()
            }
            Generate(generate::Error::UnsupportedSourceKind { component }) => {
                format!("Component {component} has a URL source, which isn't currently supported.")
            }
            Generate(generate::Error::UnsupportedFiles { component }) => {
                format!("Component {component} contains files, which isn't currently supported.")
            }
            Generate(generate::Error::MissingSource { component }) => {
                format!("Component {component} has no source. Add a source to your spin manifest and try again.")
            }
            FileExists(path) => format!("File {path} already exists. Use --override to overwrite."),
            _ => return None,
        })
    }
}

fn main() {
    let args = Cli::parse();
    let verbose = args.verbose;
    init_logging(verbose);

    match run(args) {
        Ok(_) => std::process::exit(0),
        Err(err) => {
            match err.hint() {
                Some(hint) => {
                    if verbose {
                        error!("fatal: {}", err);
                    }
                    error!("{hint}");
                }
                None => error!("fatal: {}", err),
            }
            std::process::exit(1)
        }
    }
}

/// Info lines are printed bare, warnings and errors carry their level.
/// Timestamps are only printed when `verbose` is set.
fn init_logging(verbose: bool) {
    use std::io::Write;

    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(move |buf, record| {
            if record.level() <= Level::Warn {
                write!(buf, "{} ", record.level())?;
            }
            write!(buf, "{}", record.args())?;
            if verbose {
                write!(buf, " time={}", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"))?;
            }
            writeln!(buf)
        })
        .init();
}

/// Read the config file and apply environment overrides.
///
/// If a config file name is not set explicitly, the default file is used if it exists.
/// A missing default file is not an error, and neither is a missing explicit file
/// when `init` is about to create it.
fn read_config(args: &Cli) -> Result<config::File, Error> {
    let creating = matches!(args.command, Commands::Init { .. });
    let config_file = match &args.config {
        Some(path) if creating && !Path::new(path).exists() => None,
        Some(path) => Some(path.clone()),
        None => std::fs::metadata(config::DEFAULT_CONFIG_FILE)
            .map(|metadata| metadata.is_file())
            .unwrap_or(false)
            .then(|| config::DEFAULT_CONFIG_FILE.to_string()),
    };

    let file = match config_file {
        Some(path) => config::File::load(&path)?,
        None => {
            debug!("No config file found, using defaults");
            config::File::default()
        }
    };
    Ok(file.with_env(|name| std::env::var(name).ok()))
}

fn run(args: Cli) -> Result<(), Error> {
    let cfg = read_config(&args)?;

    match args.command {
        Commands::Init {
            spin_manifest,
            overwrite,
        } => {
            let config_path = args
                .config
                .unwrap_or_else(|| config::DEFAULT_CONFIG_FILE.to_string());
            if !overwrite && Path::new(&config_path).exists() {
                return Err(FileExists(config_path));
            }
            let manifest = Manifest::parse_file(&spin_manifest)?;
            info!("Spin application {} detected", manifest.name);

            let cfg = config::File {
                spin_manifest,
                ..cfg
            };
            cfg.write(&config_path)?;
            info!("Config written to {config_path}");
        }
        Commands::Scaffold(Scaffold::Dockerfile { dest, overwrite }) => {
            let manifest_path = cfg.spin_manifest()?;
            let manifest = Manifest::parse_file(manifest_path)?;
            let dest = dest.unwrap_or_else(|| cfg.dockerfile.clone());

            let opts = dockerfile::Opts::new(&manifest, Path::new(manifest_path), Path::new(&dest))?;
            write_file(&dest, &dockerfile::generate(&opts)?, overwrite)?;
            info!("Dockerfile written to {dest}");
        }
        Commands::Scaffold(Scaffold::K8s {
            dest,
            overwrite,
            tag,
        }) => {
            let manifest_path = cfg.spin_manifest()?;
            let manifest = Manifest::parse_file(manifest_path)?;
            let dest = dest.unwrap_or_else(|| cfg.k8s_resources.clone());

            if !cfg.runtime_config.is_empty() {
                RuntimeConfig::load(&cfg.runtime_config)?;
                debug!("Runtime config {} is valid", cfg.runtime_config);
            }

            let tag = match tag {
                Some(tag) => tag,
                None => image_tag(manifest_path, &manifest).unwrap_or_else(|err| {
                    warn!("Could not derive image tag, using latest: {err}");
                    "latest".to_string()
                }),
            };
            let image = cfg.image(&manifest.name, &tag);
            debug!("Using image {image}");

            let k8s = manifests::generate(&manifest, &cfg.manifest_opts(image, OWNER_UID_PLACEHOLDER))?;
            write_file(&dest, &k8s, overwrite)?;
            info!("Kubernetes manifests written to {dest}");
        }
        Commands::Scaffold(Scaffold::RuntimeConfig { dest, overwrite }) => {
            let manifest = Manifest::parse_file(cfg.spin_manifest()?)?;
            let dest = dest.unwrap_or_else(|| match cfg.runtime_config.as_str() {
                "" => DEFAULT_RUNTIME_CONFIG.to_string(),
                path => path.to_string(),
            });

            write_file(&dest, &RuntimeConfig::from_manifest(&manifest).to_toml()?, overwrite)?;
            info!("Runtime config written to {dest}");
        }
        Commands::Build => {
            build::build(cfg.spin_manifest()?)?;
            info!("Spin application built");
        }
        Commands::Push { tag } => {
            if cfg.container_registry.login_server.is_empty() {
                return Err(RegistryNotSet);
            }
            let manifest_path = cfg.spin_manifest()?;
            let manifest = Manifest::parse_file(manifest_path)?;
            let tag = match tag {
                Some(tag) => tag,
                None => image_tag(manifest_path, &manifest)?,
            };
            let image = cfg.image(&manifest.name, &tag);
            info!("Docker image tag: {image}");

            let dockerfile_path = Path::new(&cfg.dockerfile);
            let context = parent_dir(dockerfile_path);
            if dockerfile_path.is_file() {
                docker::build(dockerfile_path, context, &image)?;
            } else {
                debug!("{} not found, building from a generated Dockerfile", cfg.dockerfile);
                let opts = dockerfile::Opts::new(&manifest, Path::new(manifest_path), dockerfile_path)?;
                docker::build_generated(&dockerfile::generate(&opts)?, context, &image)?;
            }
            docker::push(&image)?;
        }
        Commands::Deploy => {
            deploy::apply(&cfg.k8s_resources)?;
            info!("Deployed your spin app to AKS successfully 🥳");
        }
    }
    Ok(())
}

/// Content hash of the manifest and all component sources.
fn image_tag(manifest_path: &str, manifest: &Manifest) -> Result<String, Error> {
    let manifest_dir = parent_dir(Path::new(manifest_path));
    let mut paths = vec![PathBuf::from(manifest_path)];
    paths.extend(
        generate::component_sources(manifest)?
            .into_iter()
            .map(|source| manifest_dir.join(source)),
    );
    let digest = hasher::hash_paths(&paths).map_err(Hash)?;
    Ok(hasher::short(&digest).to_string())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

fn write_file(path: &str, contents: &str, overwrite: bool) -> Result<(), Error> {
    if !overwrite && Path::new(path).exists() {
        return Err(FileExists(path.to_string()));
    }
    let write_error = |err| WriteFile {
        err,
        path: path.to_string(),
    };
    std::fs::create_dir_all(parent_dir(Path::new(path))).map_err(write_error)?;
    std::fs::write(path, contents).map_err(write_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let spin_manifest = dir.path().join("spin.toml");
        std::fs::write(&spin_manifest, "name = \"hello\"\n[[component]]\nsource = \"app.wasm\"\n").unwrap();
        let config_path = dir.path().join("new-aks-spin.toml");

        run(Cli::parse_from([
            "spin-aks",
            "--config",
            config_path.to_str().unwrap(),
            "init",
            "--spin-manifest",
            spin_manifest.to_str().unwrap(),
        ]))
        .unwrap();

        let cfg = config::File::load(config_path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.spin_manifest().unwrap(), spin_manifest.to_str().unwrap());
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("missing.toml");
        let err = run(Cli::parse_from(["spin-aks", "--config", config_path.to_str().unwrap(), "build"]))
            .unwrap_err();
        assert!(matches!(err, Config(config::Error::ReadFile { .. })));
    }
}
