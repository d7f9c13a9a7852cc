pub mod merge;
pub mod schema;

pub use schema::*;

use crate::cli::RunArgs;
use crate::error::ConfigError;
use std::path::Path;

/// Load configuration by merging global, brain/explicit, and CLI sources.
/// Precedence: CLI/env > explicit or brain config > global config > defaults.
///
/// Missing config files are handled gracefully (defaults apply).
pub fn load_config(args: &RunArgs) -> anyhow::Result<AppConfig> {
    // Layer 1: Global config (~/.config/vigil/vigil.toml or platform equivalent)
    let global = load_global_config();

    // Layer 2: --config file if given, otherwise brain/vigil.toml
    let local = match &args.config {
        Some(path) => load_toml_file(path).unwrap_or_default(),
        None => {
            let brain = args
                .brain
                .clone()
                .or_else(|| global.brain.clone())
                .unwrap_or_else(|| std::path::PathBuf::from("./brain"));
            load_toml_file(&brain.join("vigil.toml")).unwrap_or_default()
        }
    };

    // Layer 3: CLI args and environment (clap resolves env vars)
    let config = run_args_to_partial(args)
        .with_fallback(local)
        .with_fallback(global)
        .finalize();

    Ok(config)
}

/// Load global config from the platform-specific config directory.
/// Returns empty PartialConfig if file not found.
fn load_global_config() -> PartialConfig {
    match global_config_path() {
        Some(p) => load_toml_file(&p).unwrap_or_default(),
        None => {
            tracing::debug!("Could not determine global config directory");
            PartialConfig::default()
        }
    }
}

/// Load and parse a TOML config file into a PartialConfig.
/// Returns None on file-not-found; parse errors are logged and ignored.
fn load_toml_file(path: &Path) -> Option<PartialConfig> {
    match read_toml_file(path) {
        Ok(Some(config_file)) => {
            tracing::info!("Loaded config from {}", path.display());
            Some(config_file.to_partial())
        }
        Ok(None) => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Ignoring config file: {}", e);
            None
        }
    }
}

fn read_toml_file(path: &Path) -> Result<Option<ConfigFile>, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    toml::from_str(&contents)
        .map(Some)
        .map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Resolve the platform-specific global config path.
/// Linux: ~/.config/vigil/vigil.toml
fn global_config_path() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("", "", "vigil")
        .map(|dirs| dirs.config_dir().join("vigil.toml"))
}

fn run_args_to_partial(args: &RunArgs) -> PartialConfig {
    PartialConfig {
        kernel_url: args.kernel_url.clone(),
        brain: args.brain.clone(),
        port: args.port,
        sleep_secs: args.sleep,
        think_timeout_secs: args.think_timeout,
        shell_timeout_secs: args.exec_timeout,
        max_subagents: args.max_subagents,
        subagent_timeout_secs: args.subagent_timeout,
        ..Default::default()
    }
}
