//! Where configuration files are looked up.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Deployment config, checked into the project.
pub const PROJECT_CONFIG_FILE: &str = "warden.toml";

/// Local overrides, kept out of version control.
pub const LOCAL_CONFIG_FILE: &str = "warden.local.toml";

/// `~/.config/warden/config.toml` on Linux, the platform equivalent elsewhere.
pub fn user_config_file() -> Option<PathBuf> {
    ProjectDirs::from("io", "Warden", "warden").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Existing config files in merge order: user, project, local.
pub fn config_sources(project_dir: impl AsRef<Path>, include_user: bool) -> Vec<PathBuf> {
    let project_dir = project_dir.as_ref();
    include_user
        .then(user_config_file)
        .flatten()
        .into_iter()
        .chain([
            project_dir.join(PROJECT_CONFIG_FILE),
            project_dir.join(LOCAL_CONFIG_FILE),
        ])
        .filter(|path| path.exists())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_sources_in_merge_order() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        assert!(config_sources(project_dir, false).is_empty());

        std::fs::write(project_dir.join(LOCAL_CONFIG_FILE), "").expect("write local");
        assert_eq!(
            config_sources(project_dir, false),
            vec![project_dir.join(LOCAL_CONFIG_FILE)]
        );

        std::fs::write(project_dir.join(PROJECT_CONFIG_FILE), "").expect("write project");
        assert_eq!(
            config_sources(project_dir, false),
            vec![
                project_dir.join(PROJECT_CONFIG_FILE),
                project_dir.join(LOCAL_CONFIG_FILE)
            ]
        );
    }

    #[test]
    fn test_user_file_is_named_for_warden() {
        if let Some(file) = user_config_file() {
            assert!(file.to_string_lossy().contains("warden"));
            assert!(file.ends_with("config.toml"));
        }
    }
}
