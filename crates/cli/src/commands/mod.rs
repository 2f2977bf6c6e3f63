pub mod chat;
pub mod serve;

use websage_config::AppConfig;

/// Load config and fail fast, loudly, when the credential is missing.
///
/// Both commands call this before rendering anything — a missing API key is
/// unrecoverable for this process.
pub fn load_config_or_die() -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Err(e) = config.require_api_key() {
        eprintln!();
        eprintln!("  ERROR: {e}");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export OPENAI_API_KEY='sk-...'");
        eprintln!("    export WEBSAGE_API_KEY='sk-...'   (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    Ok(config)
}
