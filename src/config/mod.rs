pub mod options;
pub mod snapshot;

pub use options::{
    default_options_path, expand_path, load_options_file, ControllerOptions, OptionsFile,
    ENV_ADDRESS_SPACE, ENV_ADDRESS_SPACE_PLAN,
};
pub use snapshot::{Snapshot, SnapshotError};

use std::path::Path;
use thiserror::Error;

/// Errors building controller options
#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("Missing required option {0}")]
    Missing(String),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read options file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse options file: {0}")]
    Parse(String),
}

/// Errors for file I/O operations (separate from pure parsing errors)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Snapshot error: {0}")]
    SnapshotError(#[from] SnapshotError),
}

// ============================================================================
// SBIO: I/O wrapper - thin layer over pure functions
// ============================================================================

/// Load and parse a snapshot file from disk
pub fn load_snapshot_file(path: &Path) -> Result<Snapshot, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let snapshot = Snapshot::from_str(&content)?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_snapshot_file() {
        let content = r#"{
            "addressSpace": "tenant1",
            "router": {"name": "qdrouterd", "replicas": 1},
            "addresses": [
                {"metadata": {"name": "a1"}, "spec": {"address": "a1", "type": "anycast", "plan": "small-anycast"}}
            ]
        }"#;

        let file = create_temp_file(content);
        let snapshot = load_snapshot_file(file.path()).unwrap();
        assert_eq!(snapshot.addresses.len(), 1);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_snapshot_file(Path::new("/nonexistent/snapshot.yaml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_load_invalid_snapshot() {
        let file = create_temp_file("clusters: 42");
        let result = load_snapshot_file(file.path());
        assert!(matches!(result, Err(ConfigError::SnapshotError(_))));
    }
}
