use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use crate::collection::collection::Collection;
use crate::collection::config::IndexerSink;
use crate::collection::configs::CollectionConfigs;
use crate::collection::pool::CollectionPool;
use crate::core::config::ServiceConfig;
use crate::core::error::{Error, Result};
use crate::engine::document::Document;
use crate::logger::logger::Logger;
use crate::tasks::checkpoints::{CheckPoints, IndexingErrorLog};
use crate::tasks::queue::{QueueState, ThreadsafeQueue};
use crate::tasks::tasks::{IndexingTask, ProcessingTask};

type CheckPointMap = Arc<Mutex<BTreeMap<String, CheckPoints>>>;
type ErrorLogMap = Arc<Mutex<BTreeMap<String, IndexingErrorLog>>>;

struct IndexerEntry {
    queue: Arc<ThreadsafeQueue<IndexingTask>>,
    thread: thread::JoinHandle<()>,
}

struct ManagerInner {
    pool: Arc<CollectionPool>,
    configs: CollectionConfigs,
    logger: Logger,
    processing: ThreadsafeQueue<ProcessingTask>,
    indexers: Mutex<BTreeMap<String, IndexerEntry>>,
    checkpoints: CheckPointMap,
    error_logs: ErrorLogMap,
    indexing_throttle_size: usize,
    indexing_max_size: usize,
    max_recorded_errors: usize,
    shutting_down: AtomicBool,
}

impl ManagerInner {
    fn record_error(&self, coll_name: &str, msg: String) {
        record_error(
            &self.error_logs,
            self.max_recorded_errors,
            coll_name,
            msg,
        );
    }

    /// Run one processing task: fetch a config snapshot (loading it from
    /// a readonly checkout on a miss) and feed the document through the
    /// pipe. Errors are logged against the collection; siblings proceed.
    fn process_task(&self, task: ProcessingTask) {
        let mut config = match self.configs.get(&task.coll_name) {
            Some(config) => config,
            None => {
                let coll = match self.pool.get_readonly(&task.coll_name) {
                    Ok(coll) => coll,
                    Err(e) => {
                        self.logger
                            .error_with(&format!("opening collection '{}'", task.coll_name), &e);
                        self.record_error(&task.coll_name, e.to_string());
                        return;
                    }
                };
                let config = coll.config().clone();
                self.configs.set(&task.coll_name, config.clone());
                self.pool.release(coll);
                config
            }
        };

        self.logger
            .debug(format!("sending to pipe \"{}\"", task.pipe_name));
        if let Err(e) = config.send_to_pipe(self, &task.pipe_name, task.doc) {
            self.logger.error_with(
                &format!(
                    "processing document for collection '{}' via pipe '{}'",
                    task.coll_name, task.pipe_name
                ),
                &e,
            );
            self.record_error(&task.coll_name, e.to_string());
        }
    }

    /// Queue a task onto the collection's indexing queue, starting the
    /// collection's writer thread on first use.
    fn queue_indexing(&self, coll_name: &str, task: IndexingTask) -> Result<()> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(Error::invalid_state("task manager is shutting down"));
        }
        let queue = {
            let mut indexers = self.indexers.lock();
            match indexers.get(coll_name) {
                Some(entry) => entry.queue.clone(),
                None => {
                    let queue = Arc::new(ThreadsafeQueue::new(
                        self.indexing_throttle_size,
                        self.indexing_max_size,
                    ));
                    let thread = spawn_index_worker(
                        coll_name.to_string(),
                        queue.clone(),
                        self.pool.clone(),
                        self.logger.clone(),
                        self.checkpoints.clone(),
                        self.error_logs.clone(),
                        self.max_recorded_errors,
                    );
                    indexers.insert(
                        coll_name.to_string(),
                        IndexerEntry {
                            queue: queue.clone(),
                            thread,
                        },
                    );
                    queue
                }
            }
        };

        match queue.push(task, false) {
            QueueState::HasSpace | QueueState::LowSpace => Ok(()),
            QueueState::Full => Err(Error::invalid_state(format!(
                "indexing queue for collection '{}' is full",
                coll_name
            ))),
            QueueState::Closed => Err(Error::invalid_state(format!(
                "indexing queue for collection '{}' is closed",
                coll_name
            ))),
        }
    }
}

impl IndexerSink for ManagerInner {
    fn queue_index_update(&self, coll_name: &str, idterm: &str, doc: Document) -> Result<()> {
        self.queue_indexing(
            coll_name,
            IndexingTask::UpdateDoc {
                idterm: idterm.to_string(),
                doc,
            },
        )
    }
}

fn record_error(error_logs: &ErrorLogMap, max_errors: usize, coll_name: &str, msg: String) {
    error_logs
        .lock()
        .entry(coll_name.to_string())
        .or_insert_with(|| IndexingErrorLog::new(max_errors))
        .append_error(msg, "", "");
}

/// Lazily check out the writable collection handle for a writer thread.
fn checkout<'a>(
    coll: &'a mut Option<Collection>,
    coll_name: &str,
    pool: &CollectionPool,
    logger: &Logger,
    error_logs: &ErrorLogMap,
    max_recorded_errors: usize,
) -> Option<&'a mut Collection> {
    if coll.is_none() {
        match pool.get_writable(coll_name) {
            Ok(opened) => *coll = Some(opened),
            Err(e) => {
                logger.error_with(
                    &format!("opening collection '{}' for writing", coll_name),
                    &e,
                );
                record_error(error_logs, max_recorded_errors, coll_name, e.to_string());
                return None;
            }
        }
    }
    coll.as_mut()
}

/// The single writer thread for one collection. Holds the pool's
/// writable checkout while draining its queue, so writes to the
/// collection serialise in queue order.
#[allow(clippy::too_many_arguments)]
fn spawn_index_worker(
    coll_name: String,
    queue: Arc<ThreadsafeQueue<IndexingTask>>,
    pool: Arc<CollectionPool>,
    logger: Logger,
    checkpoints: CheckPointMap,
    error_logs: ErrorLogMap,
    max_recorded_errors: usize,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut coll: Option<Collection> = None;

        while let Some(task) = queue.pop() {
            match task {
                IndexingTask::UpdateDoc { idterm, doc } => {
                    if let Some(coll) = checkout(
                        &mut coll,
                        &coll_name,
                        &pool,
                        &logger,
                        &error_logs,
                        max_recorded_errors,
                    ) {
                        if let Err(e) = coll.raw_update_doc(doc, &idterm) {
                            logger.error_with(&format!("indexing document '{}'", idterm), &e);
                            record_error(
                                &error_logs,
                                max_recorded_errors,
                                &coll_name,
                                e.to_string(),
                            );
                        }
                    }
                }
                IndexingTask::DeleteDoc { idterm } => {
                    if let Some(coll) = checkout(
                        &mut coll,
                        &coll_name,
                        &pool,
                        &logger,
                        &error_logs,
                        max_recorded_errors,
                    ) {
                        if let Err(e) = coll.raw_delete_doc(&idterm) {
                            logger.error_with(&format!("deleting document '{}'", idterm), &e);
                            record_error(
                                &error_logs,
                                max_recorded_errors,
                                &coll_name,
                                e.to_string(),
                            );
                        }
                    }
                }
                IndexingTask::Checkpoint { checkid } => {
                    if let Some(coll) = coll.as_mut() {
                        logger.info(format!(
                            "committing changes to collection \"{}\"",
                            coll_name
                        ));
                        if let Err(e) = coll.commit() {
                            logger.error_with(
                                &format!("committing collection '{}'", coll_name),
                                &e,
                            );
                            record_error(
                                &error_logs,
                                max_recorded_errors,
                                &coll_name,
                                e.to_string(),
                            );
                        }
                    }
                    let errors = error_logs.lock().remove(&coll_name);
                    checkpoints
                        .lock()
                        .entry(coll_name.clone())
                        .or_default()
                        .set_reached(&checkid, errors);
                }
            }
        }

        // Queue closed: final commit, then hand the checkout back.
        if let Some(mut coll) = coll.take() {
            if let Err(e) = coll.commit() {
                logger.error_with(&format!("committing collection '{}'", coll_name), &e);
            }
            pool.release(coll);
        }
    })
}

/// Worker threads draining the processing queue plus one writer thread
/// per collection, with per-collection checkpoints.
pub struct TaskManager {
    inner: Arc<ManagerInner>,
    worker_threads: usize,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl TaskManager {
    pub fn new(config: &ServiceConfig, pool: Arc<CollectionPool>, logger: Logger) -> Self {
        TaskManager {
            inner: Arc::new(ManagerInner {
                pool,
                configs: CollectionConfigs::new(),
                logger,
                processing: ThreadsafeQueue::new(
                    config.processing_throttle_size,
                    config.processing_max_size,
                ),
                indexers: Mutex::new(BTreeMap::new()),
                checkpoints: Arc::new(Mutex::new(BTreeMap::new())),
                error_logs: Arc::new(Mutex::new(BTreeMap::new())),
                indexing_throttle_size: config.indexing_throttle_size,
                indexing_max_size: config.indexing_max_size,
                max_recorded_errors: config.max_recorded_errors,
                shutting_down: AtomicBool::new(false),
            }),
            worker_threads: config.worker_threads,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Start the processing worker pool.
    pub fn start(&self) {
        let mut workers = self.workers.lock();
        for _ in 0..self.worker_threads {
            let inner = self.inner.clone();
            workers.push(thread::spawn(move || {
                while let Some(task) = inner.processing.pop() {
                    inner.process_task(task);
                }
            }));
        }
    }

    /// Queue a document for processing through a collection's pipe.
    pub fn queue_pipe_document(
        &self,
        coll_name: &str,
        pipe_name: &str,
        doc: Value,
        allow_throttle: bool,
    ) -> QueueState {
        self.inner.processing.push(
            ProcessingTask {
                coll_name: coll_name.to_string(),
                pipe_name: pipe_name.to_string(),
                doc,
            },
            allow_throttle,
        )
    }

    /// Queue a deletion for a collection's writer.
    pub fn queue_delete_doc(&self, coll_name: &str, doc_type: &str, doc_id: &str) -> Result<()> {
        let idterm = format!("\t{}\t{}", doc_type, doc_id);
        self.inner
            .queue_indexing(coll_name, IndexingTask::DeleteDoc { idterm })
    }

    /// Allocate a checkpoint and queue it behind everything already
    /// queued for the collection. Clients poll its state to learn when
    /// their submissions are durably applied.
    pub fn queue_checkpoint(&self, coll_name: &str) -> Result<String> {
        let checkid = self
            .inner
            .checkpoints
            .lock()
            .entry(coll_name.to_string())
            .or_default()
            .alloc_checkpoint();
        self.inner.queue_indexing(
            coll_name,
            IndexingTask::Checkpoint {
                checkid: checkid.clone(),
            },
        )?;
        Ok(checkid)
    }

    /// The state of a checkpoint, or null when unknown or expired.
    pub fn checkpoint_state(&self, coll_name: &str, checkid: &str) -> Value {
        match self.inner.checkpoints.lock().get_mut(coll_name) {
            Some(points) => points.get_state(checkid),
            None => Value::Null,
        }
    }

    pub fn checkpoint_ids(&self, coll_name: &str) -> Value {
        match self.inner.checkpoints.lock().get(coll_name) {
            Some(points) => points.ids_to_json(),
            None => Value::Array(Vec::new()),
        }
    }

    /// Sweep checkpoints untouched for longer than `max_age`.
    pub fn expire_checkpoints(&self, max_age: Duration) {
        for points in self.inner.checkpoints.lock().values_mut() {
            points.expire(max_age);
        }
    }

    /// Stop accepting work: close the processing queue. Queued documents
    /// are still processed before `join` returns.
    pub fn stop(&self) {
        self.inner.processing.close();
    }

    /// Drain and join the processing workers, then the per-collection
    /// writers.
    pub fn join(&self) {
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            let _ = worker.join();
        }

        // Workers are drained; refuse any further indexing work before
        // tearing down the writers.
        self.inner.shutting_down.store(true, Ordering::Release);

        let indexers: Vec<(String, IndexerEntry)> = {
            let mut map = self.inner.indexers.lock();
            std::mem::take(&mut *map).into_iter().collect()
        };
        for (_, entry) in indexers {
            entry.queue.close();
            let _ = entry.thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorise::categoriser::Categoriser;
    use serde_json::json;
    use tempfile::TempDir;

    fn manager_fixture(dir: &TempDir) -> (Arc<CollectionPool>, TaskManager, crate::logger::logger::LoggerHandle) {
        let pool = Arc::new(CollectionPool::new(dir.path().join("data")).unwrap());
        let (logger, handle) = Logger::spawn(Box::new(std::io::sink()));
        let config = ServiceConfig {
            worker_threads: 2,
            ..ServiceConfig::default()
        };
        let manager = TaskManager::new(&config, pool.clone(), logger);
        manager.start();
        (pool, manager, handle)
    }

    #[test]
    fn test_add_via_pipe() {
        let dir = TempDir::new().unwrap();
        let (pool, manager, _logger) = manager_fixture(&dir);

        let mut coll = pool.get_writable("default").unwrap();
        coll.from_json(&json!({
            "format": 3,
            "pipes": {"default": {"mappings": [
                {"map": [{"from": ["foo"], "to": "bar"}]}
            ]}},
            "types": {"default": {"fields": {
                "id": {"type": "id", "store_field": ""},
                "foo": {"type": "stored", "store_field": "foo"},
                "bar": {"type": "stored", "store_field": "bar"}
            }}}
        }))
        .unwrap();
        coll.commit().unwrap();
        coll.close();
        pool.release(coll);

        let mut coll = pool.get_readonly("default").unwrap();
        assert_eq!(coll.doc_count().unwrap(), 0);
        pool.release(coll);

        let state = manager.queue_pipe_document(
            "default",
            "default",
            json!({"id": "1", "foo": "Hello world"}),
            false,
        );
        assert_eq!(state, QueueState::HasSpace);

        manager.stop();
        manager.join();

        let mut coll = pool.get_readonly("default").unwrap();
        assert_eq!(coll.doc_count().unwrap(), 1);
        let doc = coll.get_document("default", "1").unwrap();
        assert_eq!(doc["data"]["bar"], json!(["Hello world"]));
        pool.release(coll);
    }

    #[test]
    fn test_pipe_with_categoriser() {
        let dir = TempDir::new().unwrap();
        let (pool, manager, _logger) = manager_fixture(&dir);

        let mut coll = pool.get_writable("default").unwrap();
        coll.from_json(&json!({
            "format": 3,
            "types": {"default": {"fields": {
                "id": {"type": "id", "store_field": ""},
                "text": {"type": "stored", "store_field": "text"},
                "lang": {"type": "stored", "store_field": "lang"}
            }}}
        }))
        .unwrap();

        let mut cat = Categoriser::new(1.03, 4, 10, 1);
        cat.add_target_profile("english", "hello world");
        cat.add_target_profile("russian", "Привет Добро");
        coll.set_categoriser("lang", cat).unwrap();

        assert_eq!(coll.categorise("lang", "Hello").unwrap(), ["english"]);
        assert_eq!(coll.categorise("lang", "Привет").unwrap(), ["russian"]);
        assert_eq!(
            coll.categorise("lang", "café").unwrap(),
            Vec::<String>::new()
        );

        let pipe = crate::pipeline::pipe::Pipe::from_json(&json!({
            "mappings": [{"map": [
                {"categoriser": "lang", "from": ["text"], "to": "lang"},
                {"from": ["text"], "to": "text"}
            ]}]
        }))
        .unwrap();
        coll.set_pipe("default", pipe).unwrap();
        coll.commit().unwrap();
        coll.close();
        pool.release(coll);

        let state = manager.queue_pipe_document(
            "default",
            "default",
            json!({"id": "2", "text": "Hello world"}),
            false,
        );
        assert_eq!(state, QueueState::HasSpace);
        manager.stop();
        manager.join();

        let mut coll = pool.get_readonly("default").unwrap();
        assert_eq!(coll.doc_count().unwrap(), 1);
        assert_eq!(coll.get_document("default", "1").unwrap(), Value::Null);

        let doc = coll.get_document("default", "2").unwrap();
        assert_eq!(doc["data"]["lang"], json!(["english"]));
        assert_eq!(doc["data"]["text"], json!(["Hello world"]));
        assert!(doc["terms"]
            .as_object()
            .unwrap()
            .contains_key("\\x09default\\x092"));
        pool.release(coll);
    }

    #[test]
    fn test_checkpoint_reached_after_drain() {
        let dir = TempDir::new().unwrap();
        let (pool, manager, _logger) = manager_fixture(&dir);

        let coll = pool.get_writable("c1").unwrap();
        pool.release(coll);

        // The default pipe has no mappings: the document passes through
        // to the indexer unchanged.
        manager.queue_pipe_document(
            "c1",
            "default",
            json!({"id": "1", "foo": "Hello world"}),
            false,
        );
        let checkid = manager.queue_checkpoint("c1").unwrap();

        manager.stop();
        manager.join();

        let state = manager.checkpoint_state("c1", &checkid);
        assert_eq!(state["reached"], json!(true));
        assert_eq!(state["total_errors"], json!(0));
        assert_eq!(manager.checkpoint_state("c1", "nonexistent"), Value::Null);

        let mut coll = pool.get_readonly("c1").unwrap();
        assert_eq!(coll.doc_count().unwrap(), 1);
        let doc = coll.get_document("default", "1").unwrap();
        assert_eq!(doc["data"]["foo"], json!(["Hello world"]));
        assert!(doc["terms"]
            .as_object()
            .unwrap()
            .contains_key("\\x09default\\x091"));
        pool.release(coll);
    }

    #[test]
    fn test_processing_errors_recorded_on_checkpoint() {
        let dir = TempDir::new().unwrap();
        let (pool, manager, _logger) = manager_fixture(&dir);

        let coll = pool.get_writable("c1").unwrap();
        pool.release(coll);

        // An id with a forbidden character fails document processing.
        manager.queue_pipe_document("c1", "default", json!({"id": "a/b"}), false);
        manager.stop();
        manager.join();

        let checkid = manager.queue_checkpoint("c1");
        // The manager is shut down, so the checkpoint cannot be queued;
        // the error log still holds the failure.
        assert!(checkid.is_err());
        let logs = manager.inner.error_logs.lock();
        assert!(!logs.get("c1").unwrap().is_empty());
    }
}
