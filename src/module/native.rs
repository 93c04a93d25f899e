//! Native dialect: modules compiled into the host and bound by name.
//!
//! A question opts in with a `server.native.toml` entry file naming the
//! registered module:
//!
//! ```toml
//! module = "fossil-fuels-radio"
//! ```

use crate::error::ModuleFault;
use crate::module::{ModuleDialect, QuestionModule};
use crate::sandbox::ExecutionContext;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub const NATIVE_ENTRY_FILE: &str = "server.native.toml";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NativeEntry {
    module: String,
}

/// Registry of host-provided question modules.
#[derive(Default)]
pub struct NativeDialect {
    modules: RwLock<HashMap<String, Arc<dyn QuestionModule>>>,
}

impl NativeDialect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a module under `name`.
    pub fn register(&self, name: impl Into<String>, module: Arc<dyn QuestionModule>) -> &Self {
        self.modules.write().insert(name.into(), module);
        self
    }

    pub fn with_module(self, name: impl Into<String>, module: Arc<dyn QuestionModule>) -> Self {
        self.register(name, module);
        self
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl ModuleDialect for NativeDialect {
    fn name(&self) -> &str {
        "native"
    }

    fn entry_file(&self) -> &str {
        NATIVE_ENTRY_FILE
    }

    fn load(
        &self,
        entry: &Path,
        _ctx: &ExecutionContext,
    ) -> Result<Arc<dyn QuestionModule>, ModuleFault> {
        let source = std::fs::read_to_string(entry)
            .map_err(|e| ModuleFault::new(format!("cannot read {}: {}", entry.display(), e)))?;
        let parsed: NativeEntry = toml::from_str(&source)
            .map_err(|e| ModuleFault::new(format!("invalid {}: {}", NATIVE_ENTRY_FILE, e)))?;
        self.modules
            .read()
            .get(&parsed.module)
            .cloned()
            .ok_or_else(|| ModuleFault::new(format!("no native module registered as {}", parsed.module)))
    }
}
