use crate::settings::Settings;
use eyre::Result;
use std::{fs, path::PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    filepath: PathBuf,
}

impl Config {
    /// Loads `configuration.json` from the app data prefix, writing the
    /// defaults there on first run.
    pub fn new() -> Result<Self> {
        let prefix = get_app_data_prefix()?;
        let filepath = prefix.join("configuration.json");

        if filepath.exists() {
            return Self::load_from(filepath);
        }

        let config = Self {
            settings: Settings::default(),
            filepath,
        };
        config.save()?;
        Ok(config)
    }

    /// Get the configuration file path
    pub fn filepath(&self) -> &PathBuf {
        &self.filepath
    }

    pub fn with_settings(settings: Settings, filepath: PathBuf) -> Self {
        Self { settings, filepath }
    }

    /// Save current configuration to file
    pub fn save(&self) -> Result<()> {
        let config_json = serde_json::json!({
            "Setting": self.settings,
        });

        let config_str = serde_json::to_string_pretty(&config_json)?;

        if let Some(parent) = self.filepath.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&self.filepath, config_str)?;
        Ok(())
    }

    /// Load configuration from a custom path. Unreadable or malformed
    /// sections fall back to defaults; unknown keys are ignored.
    pub fn load_from(filepath: PathBuf) -> Result<Self> {
        let mut settings = Settings::default();

        if filepath.exists() {
            let config_str = fs::read_to_string(&filepath)?;
            match serde_json::from_str::<serde_json::Value>(&config_str) {
                Ok(user_config) => {
                    if let Some(user_settings) = user_config.get("Setting") {
                        match serde_json::from_value::<Settings>(user_settings.clone()) {
                            Ok(parsed) => settings.merge(parsed),
                            Err(err) => {
                                tracing::warn!(path = %filepath.display(), error = %err, "ignoring malformed settings")
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(path = %filepath.display(), error = %err, "configuration is not valid JSON, using defaults")
                }
            }
        }

        Ok(Self { settings, filepath })
    }
}

pub fn get_app_data_prefix() -> Result<PathBuf> {
    if let Some(config_home) = std::env::var_os("XDG_CONFIG_HOME") {
        let path = PathBuf::from(config_home).join("folio");
        return Ok(path);
    } else if let Some(home) = std::env::var_os("HOME") {
        let path = PathBuf::from(home.clone()).join(".config").join("folio");
        if path.exists() {
            return Ok(path);
        } else {
            return Ok(PathBuf::from(home).join(".folio"));
        }
    } else if let Some(user_profile) = std::env::var_os("USERPROFILE") {
        return Ok(PathBuf::from(user_profile).join(".folio"));
    }

    Err(eyre::eyre!(
        "Could not determine application data directory"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{FontFamily, Settings, Theme};
    use std::env;
    use std::sync::{Mutex, OnceLock};
    use tempfile::tempdir;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_test_environment(dir: &tempfile::TempDir) {
        unsafe {
            env::set_var("XDG_CONFIG_HOME", dir.path());
            env::remove_var("HOME");
            env::remove_var("USERPROFILE");
        }
    }

    fn restore_test_environment(
        original_home: Option<std::ffi::OsString>,
        original_xdg_config_home: Option<std::ffi::OsString>,
        original_userprofile: Option<std::ffi::OsString>,
    ) {
        unsafe {
            if let Some(home) = original_home {
                env::set_var("HOME", home);
            } else {
                env::remove_var("HOME");
            }
            if let Some(xdg) = original_xdg_config_home {
                env::set_var("XDG_CONFIG_HOME", xdg);
            } else {
                env::remove_var("XDG_CONFIG_HOME");
            }
            if let Some(profile) = original_userprofile {
                env::set_var("USERPROFILE", profile);
            } else {
                env::remove_var("USERPROFILE");
            }
        }
    }

    #[test]
    fn test_config_new_no_existing_file() -> Result<()> {
        let _env_lock = lock_env();
        let original_home = env::var_os("HOME");
        let original_xdg_config_home = env::var_os("XDG_CONFIG_HOME");
        let original_userprofile = env::var_os("USERPROFILE");

        let dir = tempdir()?;
        set_test_environment(&dir);

        let config = Config::new()?;
        let expected_filepath = dir.path().join("folio").join("configuration.json");

        assert_eq!(config.filepath(), &expected_filepath);
        assert!(expected_filepath.exists());

        let config_str = fs::read_to_string(&expected_filepath)?;
        let json_value: serde_json::Value = serde_json::from_str(&config_str)?;
        let loaded_settings: Settings = serde_json::from_value(json_value["Setting"].clone())?;
        assert_eq!(loaded_settings, Settings::default());

        restore_test_environment(
            original_home,
            original_xdg_config_home,
            original_userprofile,
        );
        Ok(())
    }

    #[test]
    fn test_config_new_with_existing_file() -> Result<()> {
        let _env_lock = lock_env();
        let original_home = env::var_os("HOME");
        let original_xdg_config_home = env::var_os("XDG_CONFIG_HOME");
        let original_userprofile = env::var_os("USERPROFILE");

        let dir = tempdir()?;
        set_test_environment(&dir);

        let config_path = dir.path().join("folio").join("configuration.json");
        std::fs::create_dir_all(config_path.parent().unwrap())?;
        let config_json = serde_json::json!({
            "Setting": {
                "api_base_url": "https://books.example.org/api",
                "progress_debounce_ms": 400,
                "wide_profile": { "theme": "dark", "font_family": "mono" }
            }
        });
        std::fs::write(&config_path, serde_json::to_string(&config_json)?)?;

        let config = Config::new()?;
        assert_eq!(config.settings.api_base_url, "https://books.example.org/api");
        assert_eq!(config.settings.progress_debounce_ms, 400);
        assert_eq!(config.settings.wide_profile.theme, Theme::Dark);
        assert_eq!(config.settings.wide_profile.font_family, FontFamily::Mono);
        assert_eq!(config.settings.wide_profile.font_size, 100);

        restore_test_environment(
            original_home,
            original_xdg_config_home,
            original_userprofile,
        );
        Ok(())
    }

    #[test]
    fn test_get_app_data_prefix() {
        let _env_lock = lock_env();
        let original_home = env::var_os("HOME");
        let original_xdg_config_home = env::var_os("XDG_CONFIG_HOME");
        let original_userprofile = env::var_os("USERPROFILE");

        unsafe {
            let xdg_dir = tempdir().unwrap();
            env::set_var("XDG_CONFIG_HOME", xdg_dir.path());
            env::remove_var("HOME");
            env::remove_var("USERPROFILE");
            assert_eq!(get_app_data_prefix().unwrap(), xdg_dir.path().join("folio"));

            let home_dir = tempdir().unwrap();
            let config_dir = home_dir.path().join(".config").join("folio");
            std::fs::create_dir_all(&config_dir).unwrap();
            env::set_var("HOME", home_dir.path());
            env::remove_var("XDG_CONFIG_HOME");
            assert_eq!(get_app_data_prefix().unwrap(), config_dir);

            let home_dir_legacy = tempdir().unwrap();
            env::set_var("HOME", home_dir_legacy.path());
            assert_eq!(
                get_app_data_prefix().unwrap(),
                home_dir_legacy.path().join(".folio")
            );

            let profile_dir = tempdir().unwrap();
            env::set_var("USERPROFILE", profile_dir.path());
            env::remove_var("HOME");
            assert_eq!(
                get_app_data_prefix().unwrap(),
                profile_dir.path().join(".folio")
            );

            env::remove_var("USERPROFILE");
            assert!(get_app_data_prefix().is_err());

            restore_test_environment(
                original_home,
                original_xdg_config_home,
                original_userprofile,
            );
        }
    }

    #[test]
    fn test_config_save_and_load() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("configuration.json");

        let mut settings = Settings::default();
        settings.decoration_class_prefix = "hl".to_string();
        settings.compact_profile.font_size = 120;
        let config = Config::with_settings(settings, path.clone());
        config.save()?;
        assert!(path.exists());

        let loaded = Config::load_from(path)?;
        assert_eq!(loaded.settings.decoration_class_prefix, "hl");
        assert_eq!(loaded.settings.compact_profile.font_size, 120);
        Ok(())
    }

    #[test]
    fn test_config_invalid_json() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("invalid_config.json");
        std::fs::write(&path, "{ invalid json }")?;

        let config = Config::load_from(path)?;
        assert_eq!(config.settings, Settings::default());
        Ok(())
    }

    #[test]
    fn test_config_edge_cases() -> Result<()> {
        let dir = tempdir()?;

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "")?;
        assert_eq!(Config::load_from(empty)?.settings, Settings::default());

        let no_section = dir.path().join("no_section.json");
        std::fs::write(&no_section, r#"{"Keymap": {"quit": "Q"}}"#)?;
        assert_eq!(Config::load_from(no_section)?.settings, Settings::default());

        let wrong_types = dir.path().join("wrong_types.json");
        std::fs::write(&wrong_types, r#"{"Setting": {"progress_debounce_ms": "soon"}}"#)?;
        assert_eq!(Config::load_from(wrong_types)?.settings, Settings::default());

        let missing = dir.path().join("missing.json");
        assert_eq!(Config::load_from(missing)?.settings, Settings::default());
        Ok(())
    }
}
