//! Types for use when configuring meshsync modules.

use crate::*;

/// helper transcode function
fn tc<S: serde::Serialize, D: serde::de::DeserializeOwned>(
    s: &S,
) -> MsResult<D> {
    serde_json::from_str(
        &serde_json::to_string(s)
            .map_err(|e| MsError::other_src("encode", e))?,
    )
    .map_err(|e| MsError::other_src("decode", e))
}

/// Denotes a type used to configure a specific meshsync module.
///
/// These are settings that cannot be changed at runtime, the likes of which
/// might be found in a configuration file. Module configs must tolerate
/// missing properties by falling back to their defaults.
pub trait ModConfig:
    'static
    + Sized
    + Default
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
{
    /// The key under which this module config is stored.
    const MODULE_NAME: &'static str;
}

/// Meshsync configuration, a map of module configs.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Config(serde_json::Map<String, serde_json::Value>);

impl Config {
    /// When generating a default or example configuration file, call this
    /// for every module in use to add its default configuration.
    pub fn add_default_module_config<M: ModConfig>(&mut self) -> MsResult<()> {
        if self.0.contains_key(M::MODULE_NAME) {
            return Err(MsError::other(format!(
                "Refusing to overwrite conflicting module name: {}",
                M::MODULE_NAME
            )));
        }
        self.0.insert(M::MODULE_NAME.to_string(), tc(&M::default())?);
        Ok(())
    }

    /// Set the configuration of a module, replacing any previous value.
    pub fn set_module_config<M: ModConfig>(&mut self, config: &M) -> MsResult<()> {
        self.0.insert(M::MODULE_NAME.to_string(), tc(config)?);
        Ok(())
    }

    /// Extract a module config. Modules that are not configured get their
    /// default config.
    pub fn get_module_config<M: ModConfig>(&self) -> MsResult<M> {
        self.0
            .get(M::MODULE_NAME)
            .map(tc)
            .unwrap_or_else(|| Ok(M::default()))
    }
}
