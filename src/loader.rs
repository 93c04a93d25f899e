//! Module loader
//!
//! Resolves a question to a loaded [`QuestionModule`]: content is materialized
//! first, then each enabled dialect is asked in order for its entry file and the
//! first one found is loaded. Loaded modules are cached per
//! (course, question, content version, alias fingerprint). A course's content
//! version is computed once and reused until [`ModuleLoader::invalidate_course`]
//! drops it; a recomputed version that differs evicts every cached module of
//! that course.
//!
//! Concurrent loads of one key are single-flight: the first caller does the
//! work and later callers park on a oneshot waiter until it finishes.

use crate::content::{
    chunks_for_question, ContentMaterializer, CoursePathResolver, InfoTemplateResolver,
    LocalContent, PathResolver, TemplateResolver,
};
use crate::error::{LoadError, ModuleFault};
use crate::model::{Course, Question};
use crate::module::{ModuleDialect, QuestionModule};
use crate::sandbox::{ExecutionContext, PathAliases};
use crate::types::{short_hex, ContentVersion, CourseId, Hash, QuestionId};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// A module ready for phase execution.
#[derive(Clone)]
pub struct LoadedModule {
    pub module: Arc<dyn QuestionModule>,
    pub context: ExecutionContext,
    pub version: ContentVersion,
    pub entry_path: PathBuf,
    /// Name of the dialect that loaded it
    pub dialect: String,
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("entry_path", &self.entry_path)
            .field("dialect", &self.dialect)
            .field("version", &short_hex(&self.version))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ModuleKey {
    course_id: CourseId,
    question_id: QuestionId,
    qid: String,
    version: ContentVersion,
    alias_fingerprint: Hash,
}

#[derive(Default)]
struct LoadEntry {
    waiters: Vec<oneshot::Sender<Result<LoadedModule, LoadError>>>,
}

/// Removes the in-flight entry if the leading load is dropped before it
/// finishes, so parked waiters see a closed channel instead of hanging.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<ModuleKey, LoadEntry>>,
    key: Option<ModuleKey>,
}

impl InFlightGuard<'_> {
    fn finish(mut self) -> Option<LoadEntry> {
        let key = self.key.take()?;
        self.in_flight.lock().remove(&key)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            warn!(qid = %key.qid, "Module load abandoned, releasing waiters");
            self.in_flight.lock().remove(&key);
        }
    }
}

/// Loads and caches question modules.
pub struct ModuleLoader {
    materializer: Arc<dyn ContentMaterializer>,
    templates: Arc<dyn TemplateResolver>,
    paths: Arc<dyn PathResolver>,
    dialects: Vec<Arc<dyn ModuleDialect>>,
    cache: Mutex<HashMap<ModuleKey, LoadedModule>>,
    in_flight: Mutex<HashMap<ModuleKey, LoadEntry>>,
    versions: Mutex<HashMap<CourseId, ContentVersion>>,
}

impl ModuleLoader {
    pub fn new(
        materializer: Arc<dyn ContentMaterializer>,
        templates: Arc<dyn TemplateResolver>,
        paths: Arc<dyn PathResolver>,
        dialects: Vec<Arc<dyn ModuleDialect>>,
    ) -> Self {
        Self {
            materializer,
            templates,
            paths,
            dialects,
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            versions: Mutex::new(HashMap::new()),
        }
    }

    /// Loader over content already on local disk.
    pub fn local(dialects: Vec<Arc<dyn ModuleDialect>>) -> Self {
        Self::new(
            Arc::new(LocalContent::new()),
            Arc::new(InfoTemplateResolver::new()),
            Arc::new(CoursePathResolver),
            dialects,
        )
    }

    pub fn dialect_names(&self) -> Vec<String> {
        self.dialects.iter().map(|d| d.name().to_string()).collect()
    }

    /// Number of cached modules.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Drop every cached module of a course along with its content version,
    /// so the next load recomputes the version. Call after course content
    /// changes on disk.
    pub fn invalidate_course(&self, course_id: CourseId) {
        let mut cache = self.cache.lock();
        let before = cache.len();
        cache.retain(|key, _| key.course_id != course_id);
        self.versions.lock().remove(&course_id);
        debug!(
            course_id,
            evicted = before - cache.len(),
            "Invalidated cached modules for course"
        );
    }

    /// Load the module for `question`, materializing content as needed.
    pub async fn load(&self, question: &Question, course: &Course) -> Result<LoadedModule, LoadError> {
        let version = self.course_version(course).await?;

        let question_dir = course.questions_dir().join(&question.directory);
        let aliases = PathAliases::for_question(&course.path, &question_dir);
        let key = ModuleKey {
            course_id: course.id,
            question_id: question.id,
            qid: question.qid.clone(),
            version,
            alias_fingerprint: aliases.fingerprint(),
        };

        if let Some(hit) = self.cache.lock().get(&key) {
            return Ok(hit.clone());
        }

        let waiter = {
            let mut in_flight = self.in_flight.lock();
            // a leader may have finished between the cache check and here
            if let Some(hit) = self.cache.lock().get(&key) {
                return Ok(hit.clone());
            }
            match in_flight.get_mut(&key) {
                Some(entry) => {
                    let (tx, rx) = oneshot::channel();
                    entry.waiters.push(tx);
                    Some(rx)
                }
                None => {
                    in_flight.insert(key.clone(), LoadEntry::default());
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            debug!(qid = %question.qid, "Awaiting in-flight module load");
            return rx.await.unwrap_or_else(|_| {
                Err(LoadError::ModuleLoad {
                    qid: question.qid.clone(),
                    entry: String::new(),
                    source: ModuleFault::new("concurrent load was abandoned"),
                })
            });
        }

        let guard = InFlightGuard {
            in_flight: &self.in_flight,
            key: Some(key.clone()),
        };
        let result = self.load_uncached(question, course, aliases, version).await;

        if let Ok(loaded) = &result {
            // a newer version may have landed while we were loading
            let current = self.versions.lock().get(&course.id).copied();
            if current == Some(version) {
                self.cache.lock().insert(key, loaded.clone());
            }
        }

        if let Some(entry) = guard.finish() {
            for waiter in entry.waiters {
                let _ = waiter.send(result.clone());
            }
        }
        result
    }

    /// Load several questions concurrently.
    pub async fn preload(&self, items: &[(Question, Course)]) -> Vec<Result<LoadedModule, LoadError>> {
        join_all(items.iter().map(|(question, course)| self.load(question, course))).await
    }

    /// Cached content version of a course, computed on first use.
    async fn course_version(&self, course: &Course) -> Result<ContentVersion, LoadError> {
        if let Some(version) = self.versions.lock().get(&course.id).copied() {
            return Ok(version);
        }
        let version = self.materializer.content_version(course).await?;
        self.observe_version(course.id, version);
        Ok(version)
    }

    fn observe_version(&self, course_id: CourseId, version: ContentVersion) {
        let previous = self.versions.lock().insert(course_id, version);
        match previous {
            Some(previous) if previous != version => {
                let mut cache = self.cache.lock();
                cache.retain(|key, _| key.course_id != course_id);
                info!(
                    course_id,
                    previous = %short_hex(&previous),
                    current = %short_hex(&version),
                    "Course content changed, evicted cached modules"
                );
            }
            _ => {}
        }
    }

    async fn load_uncached(
        &self,
        question: &Question,
        course: &Course,
        aliases: PathAliases,
        version: ContentVersion,
    ) -> Result<LoadedModule, LoadError> {
        let templates = self.templates.template_question_ids(course, question)?;
        let chunks = chunks_for_question(question, &templates);
        self.materializer
            .ensure_content_available(course, &chunks)
            .await?;

        let context = ExecutionContext::new(aliases);
        let mut searched = Vec::new();
        let mut found = None;
        for dialect in &self.dialects {
            match self.paths.resolve_entry_point(
                dialect.entry_file(),
                &question.directory,
                &course.path,
                question,
                &templates,
            ) {
                Ok(path) => {
                    found = Some((Arc::clone(dialect), path));
                    break;
                }
                Err(not_found) => searched.extend(not_found.searched),
            }
        }

        let Some((dialect, entry_path)) = found else {
            let searched = searched
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            warn!(qid = %question.qid, course_id = course.id, "No module entry point found");
            return Err(LoadError::ModuleNotFound {
                qid: question.qid.clone(),
                searched,
            });
        };

        let entry = entry_path.clone();
        let load_ctx = context.clone();
        let load_dialect = Arc::clone(&dialect);
        let loaded = tokio::task::spawn_blocking(move || {
            catch_unwind(AssertUnwindSafe(|| load_dialect.load(&entry, &load_ctx)))
        })
        .await;

        let module = match loaded {
            Ok(Ok(Ok(module))) => module,
            Ok(Ok(Err(fault))) => return Err(self.load_error(question, &entry_path, fault)),
            Ok(Err(_)) => {
                return Err(self.load_error(question, &entry_path, ModuleFault::new("panic while loading")))
            }
            Err(join_error) => {
                return Err(self.load_error(question, &entry_path, ModuleFault::new(join_error.to_string())))
            }
        };

        info!(
            qid = %question.qid,
            course_id = course.id,
            dialect = dialect.name(),
            version = %short_hex(&version),
            "Loaded question module"
        );

        Ok(LoadedModule {
            module,
            context,
            version,
            entry_path,
            dialect: dialect.name().to_string(),
        })
    }

    fn load_error(&self, question: &Question, entry: &std::path::Path, fault: ModuleFault) -> LoadError {
        warn!(qid = %question.qid, entry = %entry.display(), error = %fault, "Module load failed");
        LoadError::ModuleLoad {
            qid: question.qid.clone(),
            entry: entry.display().to_string(),
            source: fault,
        }
    }
}
