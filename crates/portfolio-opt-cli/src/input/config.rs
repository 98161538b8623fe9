use portfolio_opt_core::config::PortfolioSettings;
use tracing::debug;

use super::file;

/// Load settings from `--config`, falling back to defaults.
pub fn load_settings(path: Option<&str>) -> Result<PortfolioSettings, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(PortfolioSettings::default());
    };
    let settings: PortfolioSettings = file::read_structured(path)?;
    settings.validate()?;
    debug!(path, "loaded settings");
    Ok(settings)
}
