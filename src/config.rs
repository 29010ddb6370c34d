use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use directories::ProjectDirs;
use clap::Parser;
use std::fs;
use tracing::{info, warn};

use crate::images::ImageKeys;
use crate::ocr::DEFAULT_GEMINI_MODEL;

/// Port used when nothing else is configured: 3001 in debug builds, 3000 in release
pub fn default_port() -> u16 {
    if cfg!(debug_assertions) { 3001 } else { 3000 }
}

/// Configuration for the Smart Student server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// URL for the database connection
    pub database_url: String,
    /// Port the HTTP server listens on
    pub port: u16,
    /// Server URL the CLI talks to; the server itself ignores it
    pub server_url: Option<String>,
    /// Gemini API key; answer sheet analysis falls back without one
    pub gemini_api_key: Option<String>,
    /// Gemini model used for answer sheet analysis and slide generation
    pub gemini_model: String,
    /// Image providers tried in order; with no key at all images fall back
    /// to a keyword URL
    pub pexels_api_key: Option<String>,
    pub unsplash_access_key: Option<String>,
    /// Google Custom Search needs both the engine id and the API key
    pub google_cse_id: Option<String>,
    pub google_api_key: Option<String>,
}

/// Update structure for Config with all fields optional
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default)]
    pub gemini_model: Option<String>,
    #[serde(default)]
    pub pexels_api_key: Option<String>,
    #[serde(default)]
    pub unsplash_access_key: Option<String>,
    #[serde(default)]
    pub google_cse_id: Option<String>,
    #[serde(default)]
    pub google_api_key: Option<String>,
}

/// Command line arguments for the server
#[derive(Parser, Debug)]
#[clap(name = "smart-student", about = "School roster service")]
pub struct CliArgs {
    /// Database URL
    #[clap(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Port to listen on
    #[clap(long, env = "SMART_STUDENT_PORT")]
    pub port: Option<u16>,

    /// Gemini API key for answer sheet analysis
    #[clap(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Gemini model for answer sheet analysis
    #[clap(long, env = "GEMINI_MODEL")]
    pub gemini_model: Option<String>,

    /// Pexels API key for slide images
    #[clap(long, env = "PEXELS_API_KEY", hide_env_values = true)]
    pub pexels_api_key: Option<String>,

    /// Unsplash access key for slide images
    #[clap(long, env = "UNSPLASH_ACCESS_KEY", hide_env_values = true)]
    pub unsplash_access_key: Option<String>,

    /// Google Custom Search engine id for slide images
    #[clap(long, env = "GOOGLE_CSE_ID")]
    pub google_cse_id: Option<String>,

    /// Google API key for Custom Search
    #[clap(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,

    /// Emit logs as JSON
    #[clap(long, env = "SMART_STUDENT_JSON_LOGS", default_value_t = false)]
    pub json_logs: bool,

    /// Debug mode
    #[clap(long, env = "SMART_STUDENT_DEBUG", default_value_t = false)]
    pub debug: bool,
}

/// A blank key in a later layer does not erase a key set in an earlier one
fn non_blank_or(update: Option<String>, current: Option<String>) -> Option<String> {
    update.filter(|key| !key.trim().is_empty()).or(current)
}

impl Config {
    /// Applies a config update to the current configuration
    pub fn apply_update(self, update: ConfigUpdate) -> Self {
        Self {
            database_url: update.database_url.unwrap_or(self.database_url),
            port: update.port.unwrap_or(self.port),
            server_url: update.server_url.or(self.server_url),
            gemini_api_key: non_blank_or(update.gemini_api_key, self.gemini_api_key),
            gemini_model: update.gemini_model.unwrap_or(self.gemini_model),
            pexels_api_key: non_blank_or(update.pexels_api_key, self.pexels_api_key),
            unsplash_access_key: non_blank_or(update.unsplash_access_key, self.unsplash_access_key),
            google_cse_id: non_blank_or(update.google_cse_id, self.google_cse_id),
            google_api_key: non_blank_or(update.google_api_key, self.google_api_key),
        }
    }

    /// The image provider keys, in the shape the image search wants them
    pub fn image_keys(&self) -> ImageKeys {
        ImageKeys {
            pexels_api_key: self.pexels_api_key.clone(),
            unsplash_access_key: self.unsplash_access_key.clone(),
            google_cse_id: self.google_cse_id.clone(),
            google_api_key: self.google_api_key.clone(),
        }
    }
}

/// Returns the base (default) configuration
pub fn base_config(data_path: Option<PathBuf>) -> Config {
    let database_url = data_path.map_or("smart_student.db".to_string(), |path| {
        path.join("smart_student.db").to_string_lossy().to_string()
    });

    Config {
        database_url,
        port: default_port(),
        server_url: None,
        gemini_api_key: None,
        gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
        pexels_api_key: None,
        unsplash_access_key: None,
        google_cse_id: None,
        google_api_key: None,
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("cl", "smart-student", "smart-student")
}

/// Returns the directory holding `config.toml`, if the platform has one
pub fn get_config_dir_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Returns the directory for the database and log files, if the platform has one
pub fn get_data_dir_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Loads configuration from a TOML file
///
/// A missing file is not an error: it yields an empty update.
pub fn config_from_file(config_path: Option<PathBuf>) -> Result<ConfigUpdate, String> {
    let Some(config_path) = config_path else {
        return Ok(ConfigUpdate::default());
    };

    if !config_path.exists() {
        info!("Config file not found at {:?}, using defaults", config_path);
        return Ok(ConfigUpdate::default());
    }

    match fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str::<ConfigUpdate>(&content) {
            Ok(config) => {
                info!("Loaded configuration from {:?}", config_path);
                Ok(config)
            },
            Err(e) => {
                warn!("Failed to parse config file: {}", e);
                Err(format!("Failed to parse config file: {}", e))
            }
        },
        Err(e) => {
            warn!("Failed to read config file: {}", e);
            Err(format!("Failed to read config file: {}", e))
        }
    }
}

/// Loads configuration from command line arguments
pub fn config_from_args(args: &CliArgs) -> ConfigUpdate {
    ConfigUpdate {
        database_url: args.database_url.clone(),
        port: args.port,
        server_url: None,
        gemini_api_key: args.gemini_api_key.clone(),
        gemini_model: args.gemini_model.clone(),
        pexels_api_key: args.pexels_api_key.clone(),
        unsplash_access_key: args.unsplash_access_key.clone(),
        google_cse_id: args.google_cse_id.clone(),
        google_api_key: args.google_api_key.clone(),
    }
}

/// Gets the complete configuration by combining defaults with
/// values from the config file, environment variables and command line
/// arguments, in order of increasing precedence
pub fn get_config(args: &CliArgs) -> Config {
    let config_file = get_config_dir_path().map(|dir| dir.join("config.toml"));
    let data_path = get_data_dir_path().filter(|path| {
        if fs::create_dir_all(path).is_err() {
            warn!("Could not create data directory {:?}, using the working directory", path);
            return false;
        }
        true
    });

    let file_update = config_from_file(config_file).unwrap_or_else(|e| {
        warn!("Ignoring config file: {}", e);
        ConfigUpdate::default()
    });

    let config = base_config(data_path)
        .apply_update(file_update)
        .apply_update(config_from_args(args));

    info!(
        "Final configuration: database_url={}, port={}, gemini_model={}, gemini_api_key={}, image_providers={:?}",
        config.database_url,
        config.port,
        config.gemini_model,
        if config.gemini_api_key.is_some() { "set" } else { "unset" },
        config.image_keys().configured()
    );

    config
}
