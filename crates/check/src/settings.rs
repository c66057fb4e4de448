//! Configuration loading.
//!
//! A TOML file (explicit path, or `meshlink.toml` / `/etc/meshlink/config.toml`
//! when present) overlaid with `MESHLINK__`-prefixed environment variables.
//! `__` separates nesting levels, e.g. `MESHLINK__RPC__LISTEN_IP=10.0.0.4`.
//!
//! The `config` crate lowercases keys, so service names loaded here are
//! lowercase.

use std::path::Path;

use meshlink_types::config::MeshConfig;

use crate::checks::CheckError;

/// Loads and validates the mesh configuration.
///
/// # Errors
///
/// Returns [`CheckError::Config`] if a source cannot be read, the merged
/// values do not deserialize, or validation fails.
pub fn load(path: Option<&Path>) -> Result<MeshConfig, CheckError> {
    let builder = config::Config::builder();

    let builder = if let Some(path) = path {
        builder.add_source(config::File::from(path).format(config::FileFormat::Toml))
    } else {
        builder
            .add_source(config::File::with_name("meshlink").required(false))
            .add_source(config::File::with_name("/etc/meshlink/config").required(false))
    };

    let builder = builder.add_source(
        config::Environment::with_prefix("MESHLINK").separator("__").try_parsing(true),
    );

    let config: MeshConfig = builder
        .build()
        .map_err(|e| CheckError::Config { message: format!("failed to load configuration: {e}") })?
        .try_deserialize()
        .map_err(|e| CheckError::Config { message: format!("failed to parse configuration: {e}") })?;

    config.validate().map_err(|e| CheckError::Config { message: e.to_string() })?;
    Ok(config)
}
