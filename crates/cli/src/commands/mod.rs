pub mod doctor;
pub mod normalize;
pub mod serve;
pub mod templates;
pub mod tools;

use ritualcraft_config::AppConfig;
use std::path::Path;

/// Load config from `path`, or from the default location when `None`.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    Ok(config.map_err(|e| format!("Failed to load config: {e}"))?)
}
