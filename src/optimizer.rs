//! Brute-force search over pipeline configurations.
//!
//! Every configuration runs as an independent trial that owns all of its
//! components. Trials share only the read-only dataset split. A trial that
//! errors or panics is recorded as a failure and never stops its siblings,
//! unless the optimizer runs in fail-fast mode. Configuration errors (an
//! empty catalog, a segmentation policy without statistics) always abort the
//! run.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::Mutex;
use std::thread;

use tracing::{debug, error, info, trace, warn};

use crate::pipeline::run_pipeline;
use crate::{ComponentCatalog, ConfigIdentity, Dataset, PipelineConfig, PipelineError, Result};

/// How trials are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// A fixed pool of worker threads; completion order is unspecified.
    Parallel { workers: usize },
    /// One trial at a time, in enumeration order.
    Sequential,
}

impl Schedule {
    /// A worker per available CPU.
    pub fn parallel() -> Self {
        Schedule::Parallel {
            workers: thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

/// What to do when a trial fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Record the failure and keep going.
    #[default]
    Recover,
    /// Return the first failure as an error. Panics are not caught.
    FailFast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialFailure {
    pub message: String,
    pub panicked: bool,
}

impl fmt::Display for TrialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.panicked {
            write!(f, "panicked: {}", self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Outcome of running one configuration.
#[derive(Debug)]
pub struct TrialResult {
    /// Position of the configuration in enumeration order.
    pub index: usize,
    pub config: PipelineConfig,
    pub outcome: std::result::Result<f64, TrialFailure>,
}

impl TrialResult {
    pub fn identity(&self) -> &ConfigIdentity {
        &self.config.identity
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn quality(&self) -> Option<f64> {
        self.outcome.as_ref().ok().copied()
    }

    pub fn error(&self) -> Option<&TrialFailure> {
        self.outcome.as_ref().err()
    }
}

/// Trial results partitioned by outcome, each part in enumeration order.
#[derive(Debug, Default)]
pub struct TrialSet {
    pub successes: Vec<TrialResult>,
    pub failures: Vec<TrialResult>,
}

impl TrialSet {
    pub fn len(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The result of a whole search: the winning trial plus every other outcome.
#[derive(Debug)]
pub struct SearchReport {
    pub trials: TrialSet,
    best: usize,
}

impl SearchReport {
    pub fn best(&self) -> &TrialResult {
        &self.trials.successes[self.best]
    }

    pub fn failures(&self) -> &[TrialResult] {
        &self.trials.failures
    }
}

impl fmt::Display for SearchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let best = self.best();
        writeln!(
            f,
            "best: {} (quality {:.4})",
            best.identity(),
            best.quality().unwrap_or_default()
        )?;
        writeln!(
            f,
            "trials: {} succeeded, {} failed",
            self.trials.successes.len(),
            self.trials.failures.len()
        )?;
        for r in &self.trials.failures {
            if let Some(failure) = r.error() {
                writeln!(f, "  failed {}: {}", r.identity(), failure)?;
            }
        }
        Ok(())
    }
}

/// Returns the trial with the highest quality. Ties keep the earliest trial.
pub fn select_best(successes: &[TrialResult]) -> Result<&TrialResult> {
    let mut best: Option<(&TrialResult, f64)> = None;
    for r in successes {
        let Some(quality) = r.quality() else {
            continue;
        };
        if best.map_or(true, |(_, bq)| quality > bq) {
            best = Some((r, quality));
        }
    }
    best.map(|(r, _)| r)
        .ok_or(PipelineError::NoSuccessfulTrials { failed: Vec::new() })
}

/// Separates configuration errors from ordinary trial failures.
fn into_fatal(err: anyhow::Error) -> std::result::Result<PipelineError, anyhow::Error> {
    match err.downcast_ref::<PipelineError>() {
        Some(e) if e.is_fatal() => err.downcast::<PipelineError>(),
        _ => Err(err),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Optimizer evaluates pipeline configurations and picks the best one. It
/// holds no state between runs.
#[derive(Debug, Clone)]
pub struct Optimizer {
    failure_policy: FailurePolicy,
    train_fraction: f64,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Recover,
            train_fraction: 0.7,
        }
    }
}

impl Optimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Share of the events, in time order, used for training.
    pub fn with_train_fraction(mut self, train_fraction: f64) -> Self {
        self.train_fraction = train_fraction;
        self
    }

    pub fn enumerate_configs(&self, catalog: &ComponentCatalog) -> Result<Vec<PipelineConfig>> {
        catalog.enumerate()
    }

    /// Runs a single configuration against `dataset`.
    pub fn run_trial(
        &self,
        index: usize,
        config: PipelineConfig,
        dataset: &Dataset,
    ) -> Result<TrialResult> {
        let split = dataset.split(self.train_fraction);
        self.execute(index, config, &split)
    }

    fn execute(
        &self,
        index: usize,
        mut config: PipelineConfig,
        (train, eval): &(Dataset, Dataset),
    ) -> Result<TrialResult> {
        debug!(trial = index, config = %config.identity, "starting trial");

        let outcome = match self.failure_policy {
            FailurePolicy::FailFast => match run_pipeline(&mut config, train, eval) {
                Ok(quality) => Ok(quality),
                Err(e) => {
                    return Err(into_fatal(e).unwrap_or_else(|source| {
                        PipelineError::TrialFailed {
                            config: config.identity.to_string(),
                            source,
                        }
                    }))
                }
            },
            FailurePolicy::Recover => {
                match panic::catch_unwind(AssertUnwindSafe(|| {
                    run_pipeline(&mut config, train, eval)
                })) {
                    Ok(Ok(quality)) => Ok(quality),
                    Ok(Err(e)) => match into_fatal(e) {
                        Ok(fatal) => return Err(fatal),
                        Err(e) => Err(TrialFailure {
                            message: format!("{:#}", e),
                            panicked: false,
                        }),
                    },
                    Err(payload) => Err(TrialFailure {
                        message: panic_message(payload.as_ref()),
                        panicked: true,
                    }),
                }
            }
        };

        if let Ok(quality) = outcome {
            info!(trial = index, config = %config.identity, quality, "trial finished");
        }
        Ok(TrialResult {
            index,
            config,
            outcome,
        })
    }

    /// Runs every configuration and partitions the results. Both parts come
    /// back in enumeration order regardless of the schedule.
    pub fn run_all(
        &self,
        configs: Vec<PipelineConfig>,
        dataset: &Dataset,
        schedule: Schedule,
    ) -> Result<TrialSet> {
        let split = dataset.split(self.train_fraction);
        let mut results = match schedule {
            Schedule::Sequential => configs
                .into_iter()
                .enumerate()
                .map(|(index, config)| self.execute(index, config, &split))
                .collect::<Result<Vec<_>>>()?,
            Schedule::Parallel { workers } => self.run_parallel(configs, &split, workers)?,
        };
        results.sort_by_key(|r| r.index);

        let (successes, failures): (Vec<_>, Vec<_>) =
            results.into_iter().partition(|r| r.succeeded());
        for r in &failures {
            if let Some(failure) = r.error() {
                warn!(trial = r.index, config = %r.identity(), error = %failure, "trial failed");
            }
        }
        info!(
            succeeded = successes.len(),
            failed = failures.len(),
            "all trials finished"
        );
        Ok(TrialSet {
            successes,
            failures,
        })
    }

    fn run_parallel(
        &self,
        configs: Vec<PipelineConfig>,
        split: &(Dataset, Dataset),
        workers: usize,
    ) -> Result<Vec<TrialResult>> {
        let total = configs.len();
        let workers = workers.clamp(1, total.max(1));
        let jobs = Mutex::new(configs.into_iter().enumerate());
        let shutdown = AtomicBool::new(false);
        let (tx, rx) = channel();

        thread::scope(|s| {
            for worker in 0..workers {
                let tx = tx.clone();
                let jobs = &jobs;
                let shutdown = &shutdown;
                s.spawn(move || self.mainloop(worker, jobs, shutdown, split, tx));
            }
        });
        drop(tx);

        let mut results = Vec::with_capacity(total);
        let mut first_error: Option<(usize, PipelineError)> = None;
        for (index, result) in rx {
            match result {
                Ok(r) => results.push(r),
                Err(e) if first_error.as_ref().map_or(true, |(i, _)| index < *i) => {
                    first_error = Some((index, e));
                }
                Err(_) => {}
            }
        }
        if let Some((index, e)) = first_error {
            error!(trial = index, error = %e, "search aborted");
            return Err(e);
        }
        Ok(results)
    }

    fn mainloop<I>(
        &self,
        worker: usize,
        jobs: &Mutex<I>,
        shutdown: &AtomicBool,
        split: &(Dataset, Dataset),
        tx: Sender<(usize, Result<TrialResult>)>,
    ) where
        I: Iterator<Item = (usize, PipelineConfig)>,
    {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
            let job = match jobs.lock() {
                Ok(mut jobs) => jobs.next(),
                Err(_) => return,
            };
            let Some((index, config)) = job else {
                return;
            };
            trace!(worker, trial = index, "picked up trial");

            let result = self.execute(index, config, split);
            if result.is_err() {
                shutdown.store(true, Ordering::SeqCst);
            }
            if let Err(e) = tx.send((index, result)) {
                warn!(worker, "failed send, worker shutting down: {}", e);
                return;
            }
        }
    }

    /// Enumerates the catalog, runs every trial and selects the best.
    pub fn optimize(
        &self,
        catalog: &ComponentCatalog,
        dataset: &Dataset,
        schedule: Schedule,
    ) -> Result<SearchReport> {
        let configs = self.enumerate_configs(catalog)?;
        info!(configurations = configs.len(), ?schedule, "starting search");

        let trials = self.run_all(configs, dataset, schedule)?;
        let best_index = match select_best(&trials.successes) {
            Ok(best) => best.index,
            Err(_) => {
                let failed: Vec<String> = trials
                    .failures
                    .iter()
                    .map(|r| r.identity().to_string())
                    .collect();
                error!(failed = failed.len(), "every trial failed");
                return Err(PipelineError::NoSuccessfulTrials { failed });
            }
        };
        let best = trials
            .successes
            .iter()
            .position(|r| r.index == best_index)
            .unwrap_or_default();

        let report = SearchReport { trials, best };
        info!(
            config = %report.best().identity(),
            quality = report.best().quality().unwrap_or_default(),
            "selected best configuration"
        );
        Ok(report)
    }
}
