use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

const APP_DIR: &str = "calagent";
const ENV_PREFIX: &str = "CALAGENT";

// calagent-core sits below the auth and calendar crates and depends on
// neither; these mirror `calagent_auth::CALENDAR_SCOPE` and
// `calagent_calendar::CALENDAR_API_BASE`, checked by the tests below.
const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OAuth client and credential file settings
    pub auth: AuthConfig,

    /// Calendar API settings
    pub calendar: CalendarConfig,

    /// Log filter settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client JSON downloaded from the Google Cloud Console
    pub client_secrets_path: PathBuf,

    /// Where the authorized-user credential is persisted
    pub token_path: PathBuf,

    /// Loopback port for the consent redirect (0 picks a free port)
    pub callback_port: u16,

    /// Open the consent page in the default browser
    pub open_browser: bool,

    /// Scopes to request during consent
    pub scopes: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let dir = default_config_dir();
        Self {
            client_secrets_path: dir.join("credentials.json"),
            token_path: dir.join("token.json"),
            callback_port: 0,
            open_browser: true,
            scopes: vec![CALENDAR_SCOPE.to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Base URL of the Calendar v3 REST API
    pub api_base_url: String,

    /// IANA zone used when a tool call doesn't name one.
    /// Falls back to the host zone when unset.
    pub timezone: Option<String>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            api_base_url: CALENDAR_API_BASE.to_string(),
            timezone: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` takes precedence
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl Config {
    /// Load configuration from defaults, the TOML file and `CALAGENT_*` env vars.
    ///
    /// `path` overrides the default file location. A missing file is fine;
    /// the defaults and environment still apply.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.display().to_string()));
                }
                p.to_path_buf()
            }
            None => Self::default_path(),
        };

        let settings = config::Config::builder()
            .add_source(config::File::from(config_path.as_path()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(" ")
                    .with_list_parse_key("auth.scopes")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        tracing::debug!("Loaded configuration (file: {:?})", config_path);
        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Any validation error fails the load. Warnings are returned for the
    /// caller to report once logging is set up.
    pub fn load_validated(path: Option<&Path>) -> Result<(Self, ValidationResult), ConfigError> {
        let config = Self::load(path)?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(
            &self.calendar.api_base_url,
            "calendar.api_base_url",
            &mut result,
        );

        if self.auth.scopes.is_empty() {
            result.add_error("auth.scopes", "At least one OAuth scope is required");
        }

        if let Some(tz) = &self.calendar.timezone {
            if tz.parse::<chrono_tz::Tz>().is_err() {
                result.add_error(
                    "calendar.timezone",
                    format!("Unknown IANA timezone: {}", tz),
                );
            }
        }

        // A saved credential can be refreshed without the client secrets,
        // so their absence only matters on first consent.
        if !self.auth.client_secrets_path.exists() {
            result.add_warning(
                "auth.client_secrets_path",
                format!(
                    "Client secrets not found at {} - first-time sign-in will fail",
                    self.auth.client_secrets_path.display()
                ),
            );
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Write this configuration as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Write(format!("{}: {}", parent.display(), e))
            })?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Write(e.to_string()))?;

        std::fs::write(path, contents)
            .map_err(|e| ConfigError::Write(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Default location of the configuration file
    pub fn default_path() -> PathBuf {
        default_config_dir().join("config.toml")
    }
}
