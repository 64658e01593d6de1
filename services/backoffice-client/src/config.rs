//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Passwords are read from `BACKOFFICE_PASSWORD` / `BACKOFFICE_NEW_PASSWORD`
//! or a password file, never stored in the TOML.

use backoffice_auth::{DEFAULT_REFRESH_INTERVAL_SECS, LOGIN_PATH, REFRESH_PATH};
use common::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Overrides `api.base_url`
pub const API_URL_ENV: &str = "BACKOFFICE_API_URL";

/// Password for `login`, `register`, and the current password for
/// `update-password`
pub const PASSWORD_ENV: &str = "BACKOFFICE_PASSWORD";

/// New password for `update-password`
pub const NEW_PASSWORD_ENV: &str = "BACKOFFICE_NEW_PASSWORD";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Backend connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Credential storage and refresh settings
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            refresh_interval_secs: default_refresh_interval(),
            refresh_path: default_refresh_path(),
            login_path: default_login_path(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("backoffice-credentials.json")
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_refresh_path() -> String {
    REFRESH_PATH.to_string()
}

fn default_login_path() -> String {
    LOGIN_PATH.to_string()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse TOML, apply `BACKOFFICE_API_URL`, and validate.
    pub fn parse(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        if let Ok(url) = std::env::var(API_URL_ENV) {
            config.api.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.session.refresh_interval_secs == 0 {
            return Err(common::Error::Config(
                "refresh_interval_secs must be greater than 0".into(),
            ));
        }

        for (name, path) in [
            ("refresh_path", &self.session.refresh_path),
            ("login_path", &self.session.login_path),
        ] {
            if !path.starts_with('/') {
                return Err(common::Error::Config(format!(
                    "{name} must start with '/', got: {path}"
                )));
            }
        }

        Ok(())
    }

    /// Absolute URL of a backend path.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.api.base_url.trim_end_matches('/'))
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("backoffice-client.toml")
    }
}

/// Resolve a password: the env var takes precedence over the file.
///
/// Returns `Ok(None)` when neither is set or the file holds only whitespace.
pub fn resolve_password(env: &str, file: Option<&Path>) -> common::Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env) {
        return Ok(Some(Secret::new(value)));
    }
    let Some(file) = file else {
        return Ok(None);
    };
    let value = std::fs::read_to_string(file).map_err(|e| {
        common::Error::Config(format!(
            "failed to read password file {}: {e}",
            file.display()
        ))
    })?;
    let value = value.trim().to_owned();
    if value.is_empty() {
        return Ok(None);
    }
    Ok(Some(Secret::new(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn valid_toml() -> &'static str {
        r#"
[api]
base_url = "http://localhost:3001"

[session]
credentials_path = "/var/lib/backoffice/credentials.json"
"#
    }

    #[test]
    fn test_load_valid_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(API_URL_ENV) };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, valid_toml()).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:3001");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(
            config.session.credentials_path,
            PathBuf::from("/var/lib/backoffice/credentials.json")
        );
        assert_eq!(config.session.refresh_interval_secs, 840);
        assert_eq!(config.session.refresh_path, "/auth/refresh");
        assert_eq!(config.session.login_path, "/auth/login");
    }

    #[test]
    fn test_session_section_is_optional() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(API_URL_ENV) };
        let config = Config::parse("[api]\nbase_url = \"https://bank.example/api\"\n").unwrap();
        assert_eq!(
            config.session.credentials_path,
            PathBuf::from("backoffice-credentials.json")
        );
        assert_eq!(
            config.endpoint("/auth/refresh"),
            "https://bank.example/api/auth/refresh"
        );
    }

    #[test]
    fn test_custom_session_settings() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(API_URL_ENV) };
        let config = Config::parse(
            r#"
[api]
base_url = "http://localhost:3001/"
timeout_secs = 5

[session]
refresh_interval_secs = 60
refresh_path = "/v2/auth/refresh"
login_path = "/v2/auth/login"
"#,
        )
        .unwrap();
        assert_eq!(config.api.timeout_secs, 5);
        assert_eq!(config.session.refresh_interval_secs, 60);
        assert_eq!(
            config.endpoint(&config.session.login_path),
            "http://localhost:3001/v2/auth/login"
        );
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(common::Error::Io(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = Config::parse("not valid {{{{ toml");
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_api_url_env_override() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env(API_URL_ENV, "https://staging.bank.example") };
        let config = Config::parse(valid_toml()).unwrap();
        assert_eq!(config.api.base_url, "https://staging.bank.example");
        unsafe { remove_env(API_URL_ENV) };
    }

    #[test]
    fn test_invalid_env_url_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env(API_URL_ENV, "staging.bank.example") };
        let result = Config::parse(valid_toml());
        unsafe { remove_env(API_URL_ENV) };
        assert!(result.is_err(), "env override must be validated too");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(API_URL_ENV) };
        let result = Config::parse("[api]\nbase_url = \"localhost:3001\"\n");
        let err = format!("{}", result.unwrap_err());
        assert!(
            err.contains("base_url must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(API_URL_ENV) };
        let result = Config::parse(
            "[api]\nbase_url = \"http://localhost:3001\"\ntimeout_secs = 0\n",
        );
        assert!(result.is_err(), "timeout_secs = 0 must be rejected");
    }

    #[test]
    fn test_zero_refresh_interval_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(API_URL_ENV) };
        let result = Config::parse(
            "[api]\nbase_url = \"http://localhost:3001\"\n[session]\nrefresh_interval_secs = 0\n",
        );
        assert!(result.is_err(), "refresh_interval_secs = 0 must be rejected");
    }

    #[test]
    fn test_relative_paths_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(API_URL_ENV) };
        let result = Config::parse(
            "[api]\nbase_url = \"http://localhost:3001\"\n[session]\nrefresh_path = \"auth/refresh\"\n",
        );
        let err = format!("{}", result.unwrap_err());
        assert!(err.contains("refresh_path"), "got: {err}");
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("backoffice-client.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_password_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env(PASSWORD_ENV, "hunter22") };
        let password = resolve_password(PASSWORD_ENV, None).unwrap();
        unsafe { remove_env(PASSWORD_ENV) };
        assert_eq!(password.unwrap().expose(), "hunter22");
    }

    #[test]
    fn test_password_from_file_is_trimmed() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(PASSWORD_ENV) };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("password");
        std::fs::write(&path, "from-file\n").unwrap();

        let password = resolve_password(PASSWORD_ENV, Some(&path)).unwrap();
        assert_eq!(password.unwrap().expose(), "from-file");
    }

    #[test]
    fn test_password_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("password");
        std::fs::write(&path, "from-file").unwrap();

        unsafe { set_env(NEW_PASSWORD_ENV, "from-env") };
        let password = resolve_password(NEW_PASSWORD_ENV, Some(&path)).unwrap();
        unsafe { remove_env(NEW_PASSWORD_ENV) };
        assert_eq!(password.unwrap().expose(), "from-env");
    }

    #[test]
    fn test_empty_password_file_yields_none() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(PASSWORD_ENV) };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("password");
        std::fs::write(&path, "  \n  ").unwrap();

        assert!(resolve_password(PASSWORD_ENV, Some(&path)).unwrap().is_none());
        assert!(resolve_password(PASSWORD_ENV, None).unwrap().is_none());
    }

    #[test]
    fn test_missing_password_file_is_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(PASSWORD_ENV) };
        let result = resolve_password(PASSWORD_ENV, Some(Path::new("/nonexistent/password")));
        assert!(matches!(result, Err(common::Error::Config(_))));
    }
}
