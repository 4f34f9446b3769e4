//! Command line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::core::{CoreSettings, InitializeOptionsBuilder, InitializeOptionsBuilderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CorsPolicyMode {
    /// Only `app://` and localhost origins, plus `--allow-origin`.
    #[default]
    Localapps,
    /// Any origin.
    All,
}

/// Local text-to-speech server for Japanese voice synthesis cores.
#[derive(Parser, Debug, Clone)]
#[command(name = "vox-engine", version, about)]
pub struct Args {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value_t = 50021)]
    pub port: u16,

    /// Run inference on the GPU when the core supports it.
    #[arg(long)]
    pub use_gpu: bool,

    /// CPU threads for inference; 0 lets the core decide.
    #[arg(long, default_value_t = 0)]
    pub cpu_num_threads: usize,

    /// Load every style's model at startup instead of on first use.
    #[arg(long)]
    pub load_all_models: bool,

    /// Use the built-in mock core instead of real models.
    #[arg(long)]
    pub enable_mock: bool,

    /// Precompiled core library.
    #[arg(long, env = "LIBCORE_PATH")]
    pub voicelib_path: Option<PathBuf>,

    /// ONNX Runtime shared library.
    #[arg(long, env = "LIBONNXRUNTIME_PATH")]
    pub runtime_path: Option<PathBuf>,

    /// Directory holding the model set.
    #[arg(long, env = "CORE_MODEL_DIR_PATH")]
    pub model_dir: Option<PathBuf>,

    /// Directory with the default dictionary, manifest and character info.
    #[arg(long, env = "VV_RESOURCE_DIR")]
    pub resource_dir: Option<PathBuf>,

    /// Directory for the user dictionary.
    #[arg(long, env = "VV_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = CorsPolicyMode::Localapps)]
    pub cors_policy_mode: CorsPolicyMode,

    /// Extra origins allowed in `localapps` mode.
    #[arg(long, num_args = 1..)]
    pub allow_origin: Vec<String>,

    /// Synthesis requests allowed in flight before new ones get 503.
    #[arg(long, default_value_t = 8)]
    pub max_pending: usize,
}

/// Resolved startup configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub addr: SocketAddr,
    pub core: CoreSettings,
    pub resource_dir: PathBuf,
    pub data_dir: PathBuf,
    pub cors_policy_mode: CorsPolicyMode,
    pub allow_origins: Vec<String>,
    pub max_pending: usize,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Invalid bind address {0}")]
    Addr(String),
    #[error(transparent)]
    Options(#[from] InitializeOptionsBuilderError),
    #[error("--max-pending must be at least 1")]
    MaxPending,
}

impl Args {
    pub fn into_config(self) -> Result<EngineConfig, ConfigError> {
        let host_port = format!("{}:{}", self.host, self.port);
        let addr: SocketAddr = host_port
            .parse()
            .map_err(|_| ConfigError::Addr(host_port.clone()))?;
        if self.max_pending == 0 {
            return Err(ConfigError::MaxPending);
        }

        let options = InitializeOptionsBuilder::default()
            .use_gpu(self.use_gpu)
            .cpu_num_threads(self.cpu_num_threads)
            .load_all_models(self.load_all_models)
            .build()?;

        Ok(EngineConfig {
            addr,
            core: CoreSettings {
                enable_mock: self.enable_mock,
                voicelib_path: self.voicelib_path,
                runtime_path: self.runtime_path,
                model_dir: self.model_dir,
                options,
            },
            resource_dir: self.resource_dir.unwrap_or_else(default_resource_dir),
            data_dir: self.data_dir.unwrap_or_else(default_data_dir),
            cors_policy_mode: self.cors_policy_mode,
            allow_origins: self.allow_origin,
            max_pending: self.max_pending,
        })
    }
}

/// `resources/` next to the executable, else in the working directory.
pub fn default_resource_dir() -> PathBuf {
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("resources")));
    match beside_exe {
        Some(dir) if dir.is_dir() => dir,
        _ => PathBuf::from("resources"),
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vox-engine")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("vox-engine").chain(args.iter().copied()))
            .expect("valid args")
    }

    #[test]
    fn defaults_match_the_standard_port() {
        let config = parse(&["--data-dir", "/tmp/vox", "--resource-dir", "/tmp/res"])
            .into_config()
            .expect("config");
        assert_eq!(config.addr, "127.0.0.1:50021".parse().expect("addr"));
        assert_eq!(config.max_pending, 8);
        assert_eq!(config.cors_policy_mode, CorsPolicyMode::Localapps);
        assert!(!config.core.enable_mock);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/vox"));
    }

    #[test]
    fn core_flags_flow_into_initialize_options() {
        let config = parse(&[
            "--use-gpu",
            "--cpu-num-threads",
            "4",
            "--load-all-models",
            "--enable-mock",
            "--cors-policy-mode",
            "all",
        ])
        .into_config()
        .expect("config");
        assert!(config.core.enable_mock);
        assert!(config.core.options.use_gpu);
        assert!(config.core.options.load_all_models);
        assert_eq!(config.core.options.cpu_num_threads, 4);
        assert_eq!(config.cors_policy_mode, CorsPolicyMode::All);
    }

    #[test]
    fn rejects_unusable_values() {
        assert!(matches!(
            parse(&["--host", "not a host"]).into_config(),
            Err(ConfigError::Addr(_))
        ));
        assert!(matches!(
            parse(&["--max-pending", "0"]).into_config(),
            Err(ConfigError::MaxPending)
        ));
    }
}
