//! Execution context for module code.
//!
//! Module code never sees the filesystem directly. It gets an [`ExecutionContext`]
//! holding a fixed map of path aliases (shared client files, shared server files,
//! the question's own directory) and may only resolve paths beneath those roots.

use crate::error::SandboxError;
use crate::types::Hash;
use blake3::Hasher;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub const CLIENT_FILES_COURSE: &str = "clientFilesCourse";
pub const SERVER_FILES_COURSE: &str = "serverFilesCourse";
pub const CLIENT_CODE: &str = "clientCode";
pub const SERVER_CODE: &str = "serverCode";
pub const QUESTION: &str = "question";

/// Alias name → absolute directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathAliases {
    roots: BTreeMap<String, PathBuf>,
}

impl PathAliases {
    /// Standard alias set for a question inside a course content root.
    pub fn for_question(course_root: &Path, question_dir: &Path) -> Self {
        let client = course_root.join(CLIENT_FILES_COURSE);
        let server = course_root.join(SERVER_FILES_COURSE);
        let mut roots = BTreeMap::new();
        roots.insert(CLIENT_FILES_COURSE.to_string(), client.clone());
        roots.insert(SERVER_FILES_COURSE.to_string(), server.clone());
        // legacy names
        roots.insert(CLIENT_CODE.to_string(), client);
        roots.insert(SERVER_CODE.to_string(), server);
        roots.insert(QUESTION.to_string(), question_dir.to_path_buf());
        Self { roots }
    }

    pub fn root(&self, alias: &str) -> Option<&Path> {
        self.roots.get(alias).map(PathBuf::as_path)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    /// Stable digest of the alias set, part of the module cache key.
    pub fn fingerprint(&self) -> Hash {
        let mut hasher = Hasher::new();
        for (alias, root) in &self.roots {
            let root = root.to_string_lossy();
            hasher.update(&(alias.len() as u64).to_be_bytes());
            hasher.update(alias.as_bytes());
            hasher.update(&(root.len() as u64).to_be_bytes());
            hasher.update(root.as_bytes());
        }
        *hasher.finalize().as_bytes()
    }
}

/// The only filesystem capability handed to module code.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    aliases: Arc<PathAliases>,
}

impl ExecutionContext {
    pub fn new(aliases: PathAliases) -> Self {
        Self {
            aliases: Arc::new(aliases),
        }
    }

    pub fn aliases(&self) -> &PathAliases {
        &self.aliases
    }

    /// Resolve `alias/relative/path` to a concrete path under the alias root.
    ///
    /// Rejects unknown aliases, absolute paths, `..` components and anything
    /// whose canonical form (after following symlinks) leaves the root.
    pub fn resolve(&self, spec: &str) -> Result<PathBuf, SandboxError> {
        let (alias, rest) = match spec.split_once('/') {
            Some((alias, rest)) => (alias, rest),
            None => (spec, ""),
        };
        let root = self
            .aliases
            .root(alias)
            .ok_or_else(|| SandboxError::UnknownAlias(alias.to_string()))?;

        let relative = Path::new(rest);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(SandboxError::PathEscape(spec.to_string())),
            }
        }

        let candidate = root.join(relative);
        if candidate.exists() {
            let canonical_root = dunce::canonicalize(root).map_err(|e| io_error(root, e))?;
            let canonical = dunce::canonicalize(&candidate).map_err(|e| io_error(&candidate, e))?;
            if !canonical.starts_with(&canonical_root) {
                return Err(SandboxError::PathEscape(spec.to_string()));
            }
            return Ok(canonical);
        }
        Ok(candidate)
    }

    pub fn exists(&self, spec: &str) -> bool {
        self.resolve(spec).map(|p| p.exists()).unwrap_or(false)
    }

    pub fn read(&self, spec: &str) -> Result<Vec<u8>, SandboxError> {
        let path = self.resolve(spec)?;
        std::fs::read(&path).map_err(|e| io_error(&path, e))
    }

    pub fn read_to_string(&self, spec: &str) -> Result<String, SandboxError> {
        let path = self.resolve(spec)?;
        std::fs::read_to_string(&path).map_err(|e| io_error(&path, e))
    }
}

fn io_error(path: &Path, err: std::io::Error) -> SandboxError {
    SandboxError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
