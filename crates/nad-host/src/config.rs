use nad_core::{Platform, WindowRole};
use nad_supervisor::probe::{ProbeConfig, DEFAULT_PROBE_TIMEOUT};
use nad_supervisor::AgentBinaryConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEV_UI_URL: &str = "http://localhost:6763";
pub const DEFAULT_UPDATE_CHECK_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Root page of the UI; window routes are appended to it.
    pub ui_url: String,
    pub agent_binary: AgentBinaryConfig,
    pub platform: Platform,
    pub app_version: String,
    /// Delay before the startup update check; `None` skips it.
    pub update_check_delay: Option<Duration>,
    pub companion_probe_timeout: Duration,
}

impl HostConfig {
    pub fn new(ui_url: impl Into<String>, agent_binary: AgentBinaryConfig, platform: Platform) -> Self {
        Self {
            ui_url: ui_url.into(),
            agent_binary,
            platform,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            update_check_delay: Some(DEFAULT_UPDATE_CHECK_DELAY),
            companion_probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn page_url(&self, role: WindowRole) -> String {
        page_url(&self.ui_url, role)
    }

    pub fn companion_probe(&self, port: u16) -> ProbeConfig {
        ProbeConfig {
            timeout: self.companion_probe_timeout,
            ..ProbeConfig::new(port)
        }
    }
}

/// Dev builds load the UI from its dev server, packaged builds from the
/// bundled `app/index.html`.
pub fn default_ui_url(dev_mode: bool, resources_dir: &Path) -> String {
    if dev_mode {
        return DEV_UI_URL.to_string();
    }
    format!("file://{}", resources_dir.join("app").join("index.html").display())
}

pub fn page_url(base: &str, role: WindowRole) -> String {
    let route = role.route();
    if route.is_empty() {
        return base.to_string();
    }
    if base.ends_with(".html") {
        format!("{base}{route}")
    } else {
        format!("{}/{route}", base.trim_end_matches('/'))
    }
}

pub fn default_env_file() -> PathBuf {
    PathBuf::from(".env").join(".env.txt")
}

/// Applies a dotenv file without overriding variables that are already set.
/// Returns how many variables were set; a missing file sets none.
pub fn load_env_file(path: &Path) -> Result<usize, dotenvy::Error> {
    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(err) if err.not_found() => return Ok(0),
        Err(err) => return Err(err),
    };
    let mut applied = 0;
    for entry in entries {
        let (key, value) = entry?;
        if std::env::var_os(&key).is_some() {
            continue;
        }
        std::env::set_var(&key, value);
        applied += 1;
    }
    debug!(event = "env_file_loaded", path = %path.display(), applied);
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_append_to_dev_server_and_bundle() {
        assert_eq!(page_url(DEV_UI_URL, WindowRole::Main), "http://localhost:6763");
        assert_eq!(
            page_url(DEV_UI_URL, WindowRole::Overlay),
            "http://localhost:6763/#/overlay"
        );
        assert_eq!(
            page_url("file:///opt/nad/app/index.html", WindowRole::BackgroundSetup),
            "file:///opt/nad/app/index.html#/background-setup"
        );
    }

    #[test]
    fn ui_url_follows_build_flavour() {
        assert_eq!(default_ui_url(true, Path::new("/res")), DEV_UI_URL);
        assert_eq!(
            default_ui_url(false, Path::new("/res")),
            "file:///res/app/index.html"
        );
    }

    #[test]
    fn env_file_does_not_override_existing_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.txt");
        std::fs::write(
            &path,
            "# gateway\nexport NAD_TEST_ENV_FRESH=\"from file\"\nNAD_TEST_ENV_PRESET=from-file\n",
        )
        .unwrap();
        std::env::set_var("NAD_TEST_ENV_PRESET", "from-shell");

        assert_eq!(load_env_file(&path).unwrap(), 1);
        assert_eq!(std::env::var("NAD_TEST_ENV_FRESH").unwrap(), "from file");
        assert_eq!(std::env::var("NAD_TEST_ENV_PRESET").unwrap(), "from-shell");
        assert_eq!(load_env_file(&dir.path().join("missing.txt")).unwrap(), 0);
    }

    #[test]
    fn malformed_env_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.txt");
        std::fs::write(&path, "NAD_TEST_ENV_BAD value\n").unwrap();
        assert!(matches!(
            load_env_file(&path),
            Err(dotenvy::Error::LineParse(..))
        ));
        assert!(std::env::var_os("NAD_TEST_ENV_BAD").is_none());
    }
}
