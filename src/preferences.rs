use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::theme::ThemeVariant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub theme: ThemeVariant,
    /// Show readings and usage bars as cost instead of energy.
    #[serde(default)]
    pub show_cost: bool,
    /// Account selected when the app was last closed.
    #[serde(default)]
    pub current_account: Option<i64>,
    /// Page shown when the app was last closed.
    #[serde(default)]
    pub current_page: Option<i64>,
    /// Minutes the power reading may stay unchanged before a notification.
    #[serde(default = "default_stale_alert_minutes")]
    pub stale_alert_minutes: u64,
    #[serde(default = "default_stale_alert_enabled")]
    pub stale_alert_enabled: bool,
}

fn default_stale_alert_minutes() -> u64 { 20 }
fn default_stale_alert_enabled() -> bool { true }
const STALE_ALERT_OPTIONS: &[u64] = &[5, 10, 20, 30, 60];

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: ThemeVariant::default(),
            show_cost: false,
            current_account: None,
            current_page: None,
            stale_alert_minutes: default_stale_alert_minutes(),
            stale_alert_enabled: default_stale_alert_enabled(),
        }
    }
}

impl Preferences {
    pub fn stale_alert_options() -> &'static [u64] {
        STALE_ALERT_OPTIONS
    }

    /// Config directory: Windows → AppData/Local/emonview/
    /// Linux → ~/.config/emonview/
    fn config_dir() -> PathBuf {
        dirs::config_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("emonview")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("preferences.json")
    }

    pub fn load() -> Self {
        let path = Self::config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => Self::from_json(&contents),
            Err(_) => Self::default(),
        }
    }

    fn from_json(contents: &str) -> Self {
        let mut prefs: Self = serde_json::from_str(contents).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "invalid preferences file, using defaults");
            Self::default()
        });
        prefs.sanitize();
        prefs
    }

    fn sanitize(&mut self) {
        if !STALE_ALERT_OPTIONS.contains(&self.stale_alert_minutes) {
            self.stale_alert_minutes = default_stale_alert_minutes();
        }
    }

    pub fn save(&self) {
        let dir = Self::config_dir();
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::error!(error = %e, "failed to create config directory");
            return;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&dir, fs::Permissions::from_mode(0o700));
        }

        let path = Self::config_path();
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, &json) {
                    tracing::error!(error = %e, "failed to save preferences");
                    return;
                }
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = fs::set_permissions(&path, fs::Permissions::from_mode(0o600));
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize preferences");
            }
        }
    }
}
