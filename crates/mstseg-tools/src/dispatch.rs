//! Bounded parallel dispatch of independent per-unit jobs.
//!
//! Jobs run on a dedicated rayon pool sized to the available parallelism minus a
//! reservation. Every job runs exactly once and yields its own outcome; a failing or
//! panicking job never stops its siblings. A limit of one worker runs everything in
//! order on the calling thread.

use rayon::prelude::*;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Cores kept free for the coordinator and the external tools' own threads.
pub const DEFAULT_RESERVED_WORKERS: usize = 2;

/// Result of one dispatched job.
#[derive(Debug, Clone)]
pub struct JobOutcome<T> {
    /// Position of the job in the submitted batch.
    pub index: usize,
    /// Display label of the job (usually the unit id).
    pub label: String,
    /// Job value or error detail.
    pub result: Result<T, String>,
}

impl<T> JobOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Error detail if the job failed.
    pub fn error(&self) -> Option<&str> {
        self.result.as_ref().err().map(|e| e.as_str())
    }
}

/// Every outcome of a batch, in submission order.
#[derive(Debug, Clone)]
pub struct DispatchReport<T> {
    outcomes: Vec<JobOutcome<T>>,
}

impl<T> DispatchReport<T> {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn outcomes(&self) -> &[JobOutcome<T>] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<JobOutcome<T>> {
        self.outcomes
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &JobOutcome<T>> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobOutcome<T>> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.is_success())
    }

    /// Transform every job value, keeping errors and order.
    pub fn map<U, F>(self, mut f: F) -> DispatchReport<U>
    where
        F: FnMut(T) -> U,
    {
        let outcomes = self
            .outcomes
            .into_iter()
            .map(|o| JobOutcome {
                index: o.index,
                label: o.label,
                result: o.result.map(&mut f),
            })
            .collect();
        DispatchReport { outcomes }
    }

    /// Log the aggregate result of the batch.
    pub fn log_summary(&self, stage: &str) {
        if self.all_succeeded() {
            tracing::info!("{}: {} job(s) succeeded", stage, self.len());
            return;
        }

        tracing::warn!(
            "{}: {}/{} job(s) failed",
            stage,
            self.failure_count(),
            self.len()
        );
        for outcome in self.failed() {
            tracing::warn!(
                "  > {}: {}",
                outcome.label,
                outcome.error().unwrap_or_default()
            );
        }
    }
}

/// Bounded worker pool for independent jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatcher {
    workers: usize,
}

impl Dispatcher {
    /// Dispatcher with an explicit worker limit (at least one).
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// One worker, jobs run in order on the calling thread.
    pub fn serial() -> Self {
        Self::new(1)
    }

    /// Dispatcher sized to the available parallelism minus `reserved`.
    pub fn with_reserved(reserved: usize) -> Self {
        Self::new(available_workers(reserved))
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn is_serial(&self) -> bool {
        self.workers == 1
    }

    /// Run `f` once per item and collect every outcome.
    ///
    /// Outcomes come back in submission order regardless of completion order.
    pub fn run_all<I, T, E, F>(&self, items: Vec<I>, f: F) -> DispatchReport<T>
    where
        I: Display + Send,
        T: Send,
        E: Display,
        F: Fn(&I) -> Result<T, E> + Sync,
    {
        let workers = self.workers.min(items.len().max(1));
        tracing::debug!(
            "Dispatching {} job(s) across {} worker(s)",
            items.len(),
            workers
        );

        if workers == 1 {
            return run_serial(items, &f);
        }

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("mstseg-worker-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!("Failed to build worker pool, running serially: {}", e);
                return run_serial(items, &f);
            }
        };

        let outcomes = pool.install(|| {
            items
                .into_par_iter()
                .enumerate()
                .map(|(index, item)| run_one(index, &item, &f))
                .collect::<Vec<_>>()
        });

        DispatchReport { outcomes }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_reserved(DEFAULT_RESERVED_WORKERS)
    }
}

/// Available parallelism minus `reserved`, never below one.
pub fn available_workers(reserved: usize) -> usize {
    num_cpus::get().saturating_sub(reserved).max(1)
}

fn run_serial<I, T, E, F>(items: Vec<I>, f: &F) -> DispatchReport<T>
where
    I: Display,
    E: Display,
    F: Fn(&I) -> Result<T, E>,
{
    let outcomes = items
        .iter()
        .enumerate()
        .map(|(index, item)| run_one(index, item, f))
        .collect();
    DispatchReport { outcomes }
}

fn run_one<I, T, E, F>(index: usize, item: &I, f: &F) -> JobOutcome<T>
where
    I: Display,
    E: Display,
    F: Fn(&I) -> Result<T, E>,
{
    let label = item.to_string();
    let result = match catch_unwind(AssertUnwindSafe(|| f(item))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    };

    if let Err(ref e) = result {
        tracing::debug!("job {} ({}) failed: {}", index, label, e);
    }

    JobOutcome {
        index,
        label,
        result,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
