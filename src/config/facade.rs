//! Config loading entry points.

use crate::config::merge::merge_policy;
use crate::config::sources::{global_file, workspace_file};
use crate::config::EngineConfig;
use config::{ConfigError, File};
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the layered configuration for a workspace.
    pub fn load(workspace_root: &Path) -> Result<EngineConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = merge_policy::add_environment(builder);
        builder.build()?.try_deserialize()
    }

    /// Load one explicit file over the defaults. Environment overrides still
    /// apply; user and workspace files do not.
    pub fn load_from_file(path: &Path) -> Result<EngineConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true));
        merge_policy::add_environment(builder)
            .build()?
            .try_deserialize()
    }

    pub fn default() -> EngineConfig {
        EngineConfig::default()
    }
}
