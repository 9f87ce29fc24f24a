//! Config file discovery, loading and template emission.
//!
//! Resolution order:
//! 1. An explicit path (CLI `--config`)
//! 2. `ARCHWATCH_CONFIG` environment variable
//! 3. `./Config.json`

use std::path::{Path, PathBuf};

use crate::{ConfigCollection, ConfigError, Result};

/// Default config filename, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "Config.json";

/// Environment variable naming the config file.
const CONFIG_PATH_ENV: &str = "ARCHWATCH_CONFIG";

/// Resolve which config file to use.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV)
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

/// Load config from a specific file path.
///
/// Files with a `.toml` extension are parsed as TOML, everything else as JSON.
pub fn load_config_file(path: &Path) -> Result<ConfigCollection> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;

    if is_toml(path) {
        ConfigCollection::from_toml(&contents)
    } else {
        ConfigCollection::from_json(&contents)
    }
}

/// Save configuration to a file, in the format implied by its extension.
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &ConfigCollection, path: &Path) -> Result<()> {
    let contents = if is_toml(path) {
        config.to_toml()?
    } else {
        config.to_json()?
    };
    write_file(path, &contents)
}

/// Write the default two-entry template to `path`.
///
/// Never overwrites an existing file.
pub fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists(path.display().to_string()));
    }
    save_config(&ConfigCollection::template(), path)
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArchiveAction;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_explicit_path_wins() {
        let path = resolve_config_path(Some(Path::new("/etc/archwatch.json")));
        assert_eq!(path, PathBuf::from("/etc/archwatch.json"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = load_config_file(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_write_default_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(DEFAULT_CONFIG_FILE);

        write_default_config(&path).unwrap();
        let loaded = load_config_file(&path).unwrap();

        assert_eq!(loaded, ConfigCollection::template());
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"sourceFolder\""));
        assert!(raw.contains("\"MOVE\""));
    }

    #[test]
    fn test_write_default_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Config.json");
        std::fs::write(&path, "{}").unwrap();

        let err = write_default_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::AlreadyExists(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_save_and_load_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("archwatch.toml");

        let mut config = ConfigCollection::template();
        config.configs[0].action = ArchiveAction::Delete;
        save_config(&config, &path).unwrap();

        let loaded = load_config_file(&path).unwrap();
        assert_eq!(loaded.configs[0].action, ArchiveAction::Delete);
        assert_eq!(loaded.configs.len(), 2);
    }

    #[test]
    fn test_load_malformed_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Config.json");
        std::fs::write(&path, "{ \"configs\": [ ").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseJson(_)));
    }
}
