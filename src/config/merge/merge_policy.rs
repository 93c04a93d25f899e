//! Merge rules: defaults and override order.
//!
//! Later sources win key by key: defaults, global file, workspace base file,
//! workspace environment file, then `QENGINE__SECTION__KEY` variables.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment};

pub const ENV_PREFIX: &str = "QENGINE";
pub const ENV_SEPARATOR: &str = "__";

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("executor.phase_timeout_ms", 10_000)?
        .set_default("loader.dialects", vec!["calculation", "native"])?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")
}

/// Environment overrides, applied last. `QENGINE__LOADER__DIALECTS` takes a
/// comma-separated list.
pub fn add_environment(
    builder: ConfigBuilder<DefaultState>,
) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .list_separator(",")
            .with_list_parse_key("loader.dialects")
            .try_parsing(true),
    )
}
