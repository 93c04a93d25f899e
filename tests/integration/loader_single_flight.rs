//! Single-flight module loading: concurrent loads of one key materialize once.

use super::test_utils::*;
use async_trait::async_trait;
use qengine::content::{
    ChunkRequest, ContentMaterializer, CoursePathResolver, InfoTemplateResolver, LocalContent,
};
use qengine::module::NativeDialect;
use qengine::types::ContentVersion;
use qengine::{Course, LoadError, ModuleLoader};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Local content that counts materializations and version hashes, and takes
/// its time materializing.
struct CountingContent {
    inner: LocalContent,
    calls: AtomicUsize,
    version_calls: AtomicUsize,
    delay: Duration,
}

impl CountingContent {
    fn new(delay: Duration) -> Self {
        Self {
            inner: LocalContent::new(),
            calls: AtomicUsize::new(0),
            version_calls: AtomicUsize::new(0),
            delay,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn version_calls(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentMaterializer for CountingContent {
    async fn ensure_content_available(
        &self,
        course: &Course,
        chunks: &[ChunkRequest],
    ) -> Result<(), LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.ensure_content_available(course, chunks).await
    }

    async fn content_version(&self, course: &Course) -> Result<ContentVersion, LoadError> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.content_version(course).await
    }
}

fn counting_loader(content: Arc<CountingContent>) -> Arc<ModuleLoader> {
    Arc::new(ModuleLoader::new(
        content,
        Arc::new(InfoTemplateResolver::new()),
        Arc::new(CoursePathResolver),
        dialects(NativeDialect::new()),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loads_materialize_once() {
    let fixture = CourseFixture::new();
    let question = fixture.add_question(
        "addVectors",
        1,
        ADD_VECTORS_INFO,
        Some(("server.toml", ADD_VECTORS)),
    );
    let content = Arc::new(CountingContent::new(Duration::from_millis(100)));
    let loader = counting_loader(content.clone());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let loader = loader.clone();
        let question = question.clone();
        let course = fixture.course.clone();
        handles.push(tokio::spawn(async move {
            loader.load(&question, &course).await
        }));
    }
    for handle in handles {
        let loaded = handle.await.unwrap().unwrap();
        assert_eq!(loaded.dialect, "calculation");
    }

    assert_eq!(content.calls(), 1);
    assert_eq!(loader.cached_len(), 1);

    // cached now
    loader.load(&question, &fixture.course).await.unwrap();
    assert_eq!(content.calls(), 1);
}

#[tokio::test]
async fn test_distinct_questions_load_separately() {
    let fixture = CourseFixture::new();
    let q1 = fixture.add_question(
        "addVectors",
        1,
        ADD_VECTORS_INFO,
        Some(("server.toml", ADD_VECTORS)),
    );
    let q2 = fixture.add_question(
        "fossilFuelsRadio",
        2,
        FOSSIL_FUELS_INFO,
        Some(("server.toml", FOSSIL_FUELS_RADIO)),
    );
    let content = Arc::new(CountingContent::new(Duration::from_millis(10)));
    let loader = counting_loader(content.clone());

    let results = loader
        .preload(&[
            (q1.clone(), fixture.course.clone()),
            (q2.clone(), fixture.course.clone()),
            (q1, fixture.course.clone()),
        ])
        .await;
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(content.calls(), 2);
    assert_eq!(loader.cached_len(), 2);
}

#[tokio::test]
async fn test_content_change_evicts_cached_modules() {
    let fixture = CourseFixture::new();
    let question = fixture.add_question(
        "addVectors",
        1,
        ADD_VECTORS_INFO,
        Some(("server.toml", ADD_VECTORS)),
    );
    let content = Arc::new(CountingContent::new(Duration::ZERO));
    let loader = counting_loader(content.clone());

    let first = loader.load(&question, &fixture.course).await.unwrap();
    fixture.write("clientFilesCourse/notes.txt", "new content");
    loader.invalidate_course(fixture.course.id);
    let second = loader.load(&question, &fixture.course).await.unwrap();

    assert_ne!(first.version, second.version);
    assert_eq!(content.calls(), 2);
    assert_eq!(content.version_calls(), 2);
    assert_eq!(loader.cached_len(), 1);
}

#[tokio::test]
async fn test_cache_hits_skip_version_hashing() {
    let fixture = CourseFixture::new();
    let q1 = fixture.add_question(
        "addVectors",
        1,
        ADD_VECTORS_INFO,
        Some(("server.toml", ADD_VECTORS)),
    );
    let q2 = fixture.add_question(
        "fossilFuelsRadio",
        2,
        FOSSIL_FUELS_INFO,
        Some(("server.toml", FOSSIL_FUELS_RADIO)),
    );
    let content = Arc::new(CountingContent::new(Duration::ZERO));
    let loader = counting_loader(content.clone());

    for _ in 0..5 {
        loader.load(&q1, &fixture.course).await.unwrap();
        loader.load(&q2, &fixture.course).await.unwrap();
    }
    assert_eq!(content.version_calls(), 1);
    assert_eq!(content.calls(), 2);

    // unrelated edits go unnoticed until the course is invalidated
    fixture.write("clientFilesCourse/notes.txt", "edited");
    let stale = loader.load(&q1, &fixture.course).await.unwrap();
    assert_eq!(content.version_calls(), 1);

    loader.invalidate_course(fixture.course.id);
    let fresh = loader.load(&q1, &fixture.course).await.unwrap();
    assert_ne!(stale.version, fresh.version);
    assert_eq!(content.version_calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_load_releases_waiters() {
    let fixture = CourseFixture::new();
    let question = fixture.add_question(
        "addVectors",
        1,
        ADD_VECTORS_INFO,
        Some(("server.toml", ADD_VECTORS)),
    );
    let content = Arc::new(CountingContent::new(Duration::from_secs(1)));
    let loader = counting_loader(content.clone());

    let leader = {
        let loader = loader.clone();
        let question = question.clone();
        let course = fixture.course.clone();
        tokio::spawn(async move { loader.load(&question, &course).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let waiter = {
        let loader = loader.clone();
        let question = question.clone();
        let course = fixture.course.clone();
        tokio::spawn(async move { loader.load(&question, &course).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    leader.abort();

    let result = waiter.await.unwrap();
    match result {
        Err(LoadError::ModuleLoad { source, .. }) => {
            assert!(source.message.contains("abandoned"));
        }
        other => panic!("expected abandoned load error, got {:?}", other.map(|m| m.dialect)),
    }
    assert_eq!(content.calls(), 1);
    assert_eq!(loader.cached_len(), 0);

    // the key is free again
    assert!(loader.load(&question, &fixture.course).await.is_ok());
    assert_eq!(content.calls(), 2);
}
