//! Config path resolution
//!
//! Resolves where the engine config lives: `$RANKGUARD_HOME` if set,
//! otherwise the directory holding the running executable.

use std::path::PathBuf;

use super::{ConfigError, ConfigResult};

/// Environment variable that overrides the base directory
pub const HOME_ENV: &str = "RANKGUARD_HOME";

/// Config file name inside the configs directory
pub const CONFIG_FILE_NAME: &str = "rankguard.toml";

/// Returns the rankguard base directory.
///
/// Uses `$RANKGUARD_HOME` when set, otherwise the executable's directory.
pub fn base_dir() -> ConfigResult<PathBuf> {
    if let Some(home) = std::env::var_os(HOME_ENV) {
        return Ok(PathBuf::from(home));
    }

    let exe = std::env::current_exe().map_err(ConfigError::IoError)?;
    exe.parent()
        .map(PathBuf::from)
        .ok_or(ConfigError::NoConfigDirectory)
}

/// Returns the configs directory.
///
/// Path: `{base}/configs/`
pub fn configs_dir() -> ConfigResult<PathBuf> {
    Ok(base_dir()?.join("configs"))
}

/// Returns the engine config path.
///
/// Path: `{base}/configs/rankguard.toml`
pub fn engine_config_path() -> ConfigResult<PathBuf> {
    Ok(configs_dir()?.join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_path_format() {
        let path = engine_config_path().unwrap();
        assert!(path.ends_with("configs/rankguard.toml"));
    }
}
