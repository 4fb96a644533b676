//! Settings for the dashboard and where to read them from.

use std::{fs, path::Path};

use crate::{Error, category::CategoryCatalog};

/// The environment variable holding the canonical timezone name used to
/// display transaction times, e.g. "Pacific/Auckland".
pub const TIMEZONE_ENV_VAR: &str = "DAILY_SPEND_TIMEZONE";

/// The config for the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    /// The amount the user plans to spend each month.
    pub monthly_budget: f64,
    /// How many transactions the recent list shows.
    pub recent_limit: usize,
    /// The canonical timezone name used to display transaction times.
    pub local_timezone: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            monthly_budget: 2000.0,
            recent_limit: 5,
            local_timezone: "Etc/UTC".to_owned(),
        }
    }
}

impl DashboardConfig {
    /// The default config, with the timezone taken from [TIMEZONE_ENV_VAR] if it is set.
    pub fn from_env() -> Self {
        match std::env::var(TIMEZONE_ENV_VAR) {
            Ok(local_timezone) if !local_timezone.trim().is_empty() => Self {
                local_timezone: local_timezone.trim().to_owned(),
                ..Default::default()
            },
            _ => Self::default(),
        }
    }
}

/// Read a category catalog from the JSON file at `path`.
///
/// # Errors
/// Returns an [Error::InvalidCatalog] if the file cannot be read or does not
/// hold a valid catalog.
pub fn load_catalog(path: &Path) -> Result<CategoryCatalog, Error> {
    let json = fs::read_to_string(path).map_err(|error| {
        tracing::error!("could not read category catalog {}: {error}", path.display());
        Error::InvalidCatalog(format!("could not read {}: {error}", path.display()))
    })?;

    CategoryCatalog::from_json(&json)
}
