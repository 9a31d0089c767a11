//! In-process batch runner.
//!
//! One task per entity goes onto an mpsc queue; a fixed pool of scoped worker
//! threads drains it. Every worker owns its collaborators (for SQLite, its own
//! connection), built by a factory on the worker thread. A failed or
//! panicking entity is reported and the worker moves on to the next task.

use anyhow::Context;
use chrono::NaiveDate;
use flowcast_core::corpus::DemandCorpusReader;
use flowcast_core::db::{self, SqliteCorpus, SqliteSnapshotStore};
use flowcast_core::error::ErrorCode;
use flowcast_core::model::EntityRef;
use flowcast_core::store::SnapshotStore;
use flowcast_stats::forecast::{Forecaster, MonteCarloForecaster};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread;

use crate::builder::{BuilderSettings, ConsolidationReport, SnapshotBuilder};
use crate::error::ConsolidationError;

/// Something that can consolidate one entity at a time.
pub trait ConsolidationWorker {
    /// # Errors
    ///
    /// The run's [`ConsolidationError`].
    fn consolidate(
        &mut self,
        entity: &EntityRef,
        as_of: NaiveDate,
    ) -> Result<ConsolidationReport, ConsolidationError>;
}

/// Worker with a private SQLite connection.
pub struct SqliteWorker {
    conn: Connection,
    forecaster: MonteCarloForecaster,
    settings: BuilderSettings,
}

impl SqliteWorker {
    /// Open a dedicated connection to the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(
        path: &Path,
        forecaster: MonteCarloForecaster,
        settings: BuilderSettings,
    ) -> anyhow::Result<Self> {
        let conn = db::open_store(path)
            .with_context(|| format!("open worker connection to {}", path.display()))?;
        Ok(Self {
            conn,
            forecaster,
            settings,
        })
    }
}

impl ConsolidationWorker for SqliteWorker {
    fn consolidate(
        &mut self,
        entity: &EntityRef,
        as_of: NaiveDate,
    ) -> Result<ConsolidationReport, ConsolidationError> {
        let corpus = SqliteCorpus::new(&self.conn);
        let store = SqliteSnapshotStore::new(&self.conn);
        SnapshotBuilder::new(&corpus, &store, &self.forecaster, self.settings)
            .run_consolidation(entity, as_of)
    }
}

/// Worker over collaborators shared by reference, e.g. in-memory ones.
pub struct SharedWorker<'a> {
    corpus: &'a dyn DemandCorpusReader,
    store: &'a dyn SnapshotStore,
    forecaster: &'a dyn Forecaster,
    settings: BuilderSettings,
}

impl<'a> SharedWorker<'a> {
    #[must_use]
    pub fn new(
        corpus: &'a dyn DemandCorpusReader,
        store: &'a dyn SnapshotStore,
        forecaster: &'a dyn Forecaster,
        settings: BuilderSettings,
    ) -> Self {
        Self {
            corpus,
            store,
            forecaster,
            settings,
        }
    }
}

impl ConsolidationWorker for SharedWorker<'_> {
    fn consolidate(
        &mut self,
        entity: &EntityRef,
        as_of: NaiveDate,
    ) -> Result<ConsolidationReport, ConsolidationError> {
        SnapshotBuilder::new(self.corpus, self.store, self.forecaster, self.settings)
            .run_consolidation(entity, as_of)
    }
}

/// One entity that did not get a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub entity: EntityRef,
    pub code: String,
    pub message: String,
}

impl BatchFailure {
    fn new(entity: EntityRef, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            entity,
            code: code.code().to_string(),
            message: message.into(),
        }
    }
}

/// Outcome of a batch, sorted by entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub as_of: NaiveDate,
    pub succeeded: Vec<ConsolidationReport>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum TaskResult {
    Done(Box<ConsolidationReport>),
    Failed(BatchFailure),
    WorkerDown(String),
}

/// Fixed-size worker pool for a day's consolidations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRunner {
    workers: usize,
}

impl BatchRunner {
    #[must_use]
    pub fn new(workers: u32) -> Self {
        Self {
            workers: (workers as usize).max(1),
        }
    }

    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Consolidate every entity in `entities` for `as_of`.
    ///
    /// `factory(i)` builds worker `i` on its own thread. Entities left over
    /// because no worker could start are reported as failed.
    pub fn run<W, F>(&self, as_of: NaiveDate, entities: Vec<EntityRef>, factory: F) -> BatchReport
    where
        W: ConsolidationWorker,
        F: Fn(usize) -> anyhow::Result<W> + Sync,
    {
        let pending: BTreeSet<EntityRef> = entities.into_iter().collect();
        let worker_count = self.workers.min(pending.len()).max(1);
        tracing::info!(%as_of, entities = pending.len(), workers = worker_count, "starting batch");

        let (task_tx, task_rx) = mpsc::channel::<EntityRef>();
        for entity in &pending {
            if task_tx.send(entity.clone()).is_err() {
                break;
            }
        }
        drop(task_tx);

        let tasks = Mutex::new(task_rx);
        let (result_tx, result_rx) = mpsc::channel::<TaskResult>();

        thread::scope(|scope| {
            for index in 0..worker_count {
                let results = result_tx.clone();
                let tasks = &tasks;
                let factory = &factory;
                scope.spawn(move || worker_loop(index, as_of, factory, tasks, &results));
            }
        });
        drop(result_tx);

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut startup_errors = Vec::new();
        for result in result_rx {
            match result {
                TaskResult::Done(report) => succeeded.push(*report),
                TaskResult::Failed(failure) => failed.push(failure),
                TaskResult::WorkerDown(reason) => startup_errors.push(reason),
            }
        }

        let mut reported: BTreeSet<EntityRef> = failed.iter().map(|f| f.entity.clone()).collect();
        reported.extend(succeeded.iter().map(|r| r.snapshot.key.entity.clone()));
        let reason = startup_errors
            .first()
            .cloned()
            .unwrap_or_else(|| "no worker picked up the task".to_string());
        for entity in pending.difference(&reported) {
            failed.push(BatchFailure::new(
                entity.clone(),
                ErrorCode::CorpusUnavailable,
                reason.clone(),
            ));
        }

        succeeded.sort_by(|a, b| a.snapshot.key.cmp(&b.snapshot.key));
        failed.sort_by(|a, b| a.entity.cmp(&b.entity));

        tracing::info!(
            %as_of,
            succeeded = succeeded.len(),
            failed = failed.len(),
            "batch finished"
        );
        BatchReport {
            as_of,
            succeeded,
            failed,
        }
    }
}

fn worker_loop<W, F>(
    index: usize,
    as_of: NaiveDate,
    factory: &F,
    tasks: &Mutex<Receiver<EntityRef>>,
    results: &Sender<TaskResult>,
) where
    W: ConsolidationWorker,
    F: Fn(usize) -> anyhow::Result<W>,
{
    let mut worker = match factory(index) {
        Ok(worker) => worker,
        Err(err) => {
            let reason = format!("{err:#}");
            tracing::error!(worker = index, error = %reason, "worker failed to start");
            let _ = results.send(TaskResult::WorkerDown(reason));
            return;
        }
    };

    loop {
        let next = tasks.lock().unwrap_or_else(PoisonError::into_inner).recv();
        let Ok(entity) = next else {
            break;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker.consolidate(&entity, as_of)));
        let result = match outcome {
            Ok(Ok(report)) => TaskResult::Done(Box::new(report)),
            Ok(Err(err)) => {
                tracing::warn!(worker = index, entity = %entity, code = %err.code(), error = %err, "consolidation failed");
                TaskResult::Failed(BatchFailure::new(entity, err.code(), err.to_string()))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(worker = index, entity = %entity, %message, "consolidation panicked");
                TaskResult::Failed(BatchFailure::new(
                    entity,
                    ErrorCode::InternalUnexpected,
                    message,
                ))
            }
        };

        if results.send(result).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcast_core::corpus::MemoryCorpus;
    use flowcast_core::model::EntityProfile;
    use flowcast_core::store::MemorySnapshotStore;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).expect("valid date")
    }

    fn corpus_with(ids: &[&str]) -> MemoryCorpus {
        let mut corpus = MemoryCorpus::new();
        for id in ids {
            corpus.insert_entity(
                EntityRef::project(*id),
                EntityProfile {
                    start_date: date(1),
                    end_date: Some(date(30)),
                    initial_scope: 4,
                    wip_limit: 2,
                    peer_group: None,
                },
            );
        }
        corpus
    }

    struct Panicking;

    impl ConsolidationWorker for Panicking {
        fn consolidate(
            &mut self,
            entity: &EntityRef,
            _: NaiveDate,
        ) -> Result<ConsolidationReport, ConsolidationError> {
            panic!("boom on {entity}");
        }
    }

    #[test]
    fn failures_are_isolated_per_entity() {
        let corpus = corpus_with(&["a", "b", "c", "d"]);
        let store = MemorySnapshotStore::new();
        let forecaster = MonteCarloForecaster::new(520, false);
        let settings = BuilderSettings {
            trials: 200,
            ..BuilderSettings::default()
        };

        let mut entities: Vec<EntityRef> =
            ["a", "b", "c", "d"].iter().map(|id| EntityRef::project(*id)).collect();
        entities.push(EntityRef::project("ghost"));

        let report = BatchRunner::new(3).run(date(10), entities, |_| {
            Ok(SharedWorker::new(&corpus, &store, &forecaster, settings))
        });

        assert_eq!(report.succeeded.len(), 4);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].entity, EntityRef::project("ghost"));
        assert_eq!(report.failed[0].code, "E2001");
        assert_eq!(store.len(), 4);
        assert!(!report.is_clean());
    }

    #[test]
    fn panics_do_not_stop_the_batch() {
        let entities = vec![EntityRef::project("x"), EntityRef::project("y")];
        let report = BatchRunner::new(1).run(date(3), entities, |_| Ok(Panicking));

        assert!(report.succeeded.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed.iter().all(|f| f.code == "E9001"));
        assert!(report.failed[0].message.contains("boom on project:x"));
    }

    #[test]
    fn workers_that_cannot_start_fail_their_entities() {
        let entities = vec![EntityRef::team("t-1"), EntityRef::team("t-2")];
        let report = BatchRunner::new(2).run(date(3), entities, |index| {
            Err::<Panicking, _>(anyhow::anyhow!("no database for worker {index}"))
        });

        assert_eq!(report.failed.len(), 2);
        assert!(report.failed.iter().all(|f| f.message.starts_with("no database")));
    }

    #[test]
    fn empty_batch_is_clean() {
        let report = BatchRunner::new(4).run(date(3), Vec::new(), |_| Ok(Panicking));
        assert!(report.is_clean());
        assert!(report.succeeded.is_empty());
    }

    #[test]
    fn duplicate_entities_run_once() {
        let corpus = corpus_with(&["a"]);
        let store = MemorySnapshotStore::new();
        let forecaster = MonteCarloForecaster::new(520, false);
        let entity = EntityRef::project("a");

        let report = BatchRunner::new(2).run(date(5), vec![entity.clone(), entity], |_| {
            Ok(SharedWorker::new(&corpus, &store, &forecaster, BuilderSettings::default()))
        });
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(store.len(), 1);
    }
}
