//! Standard locations for OtoDeck files

use std::path::PathBuf;

/// Name of the config file inside the data directory
pub const CONFIG_FILENAME: &str = "config.yaml";

/// OtoDeck data directory: `~/Music/otodeck`
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Music")
        .join("otodeck")
}

/// `~/Music/otodeck/config.yaml`
pub fn default_config_path() -> PathBuf {
    default_data_dir().join(CONFIG_FILENAME)
}

/// `~/Music/otodeck/recordings`
pub fn default_recordings_dir() -> PathBuf {
    default_data_dir().join("recordings")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_live_under_data_dir() {
        let data = default_data_dir();
        assert!(data.ends_with("Music/otodeck"));
        assert_eq!(default_config_path(), data.join("config.yaml"));
        assert!(default_recordings_dir().starts_with(&data));
    }
}
