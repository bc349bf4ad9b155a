use std::collections::HashMap;
use std::mem;
use std::path::PathBuf;

use log::{error, trace, warn};

use crate::error::{CountError, RunError};
use crate::freq_table::{merge_into, Chunk, FreqTable};
use crate::worker::WorkerSummary;

/// Message from a worker to the aggregator. `file` indexes the input list.
#[derive(Debug)]
pub enum WorkerEvent {
    Chunk { file: usize, chunk: Chunk },
    Finished { file: usize, summary: WorkerSummary },
    Failed { file: usize, error: CountError },
}

/// What the run does once a worker fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Report the first failure at once and cancel the other workers
    FailFast,
    /// Let every worker end, then report all failures with the counts of
    /// the workers that succeeded
    WaitAll,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::FailFast
    }
}

/// Merged outcome of a successful run
#[derive(Debug, Default)]
pub struct Aggregate {
    pub frequency: FreqTable,
    pub totals: WorkerSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileState {
    Running,
    Finished,
    Failed,
}

/// Owns the global table and folds worker events into it.
///
/// Must be driven from a single consumer; nothing in here is shared.
pub struct Aggregator {
    policy: FailurePolicy,
    paths: Vec<PathBuf>,
    states: Vec<FileState>,
    reported: usize,
    global: FreqTable,
    staged: HashMap<usize, FreqTable>,
    totals: WorkerSummary,
    failures: Vec<CountError>,
}

impl Aggregator {
    pub fn new(paths: Vec<PathBuf>, policy: FailurePolicy) -> Self {
        let files = paths.len();
        Aggregator {
            policy,
            paths,
            states: vec![FileState::Running; files],
            reported: 0,
            global: FreqTable::new(),
            staged: HashMap::new(),
            totals: WorkerSummary::default(),
            failures: Vec::new(),
        }
    }

    /// Every worker has reported completion or failure.
    pub fn is_complete(&self) -> bool {
        self.reported == self.paths.len()
    }

    pub fn completed(&self) -> usize {
        self.reported
    }

    /// Folds one event. Under fail-fast a failure is returned right away.
    pub fn accept(&mut self, event: WorkerEvent) -> Result<(), RunError> {
        match event {
            WorkerEvent::Chunk { file, chunk } => {
                if !self.is_running(file) {
                    warn!("dropping chunk from {} after it ended", self.describe(file));
                    return Ok(());
                }
                trace!("merging {} identifiers from {}", chunk.len(), self.describe(file));
                match self.policy {
                    FailurePolicy::FailFast => merge_into(&mut self.global, chunk),
                    FailurePolicy::WaitAll => merge_into(self.staged.entry(file).or_default(), chunk),
                }
            }
            WorkerEvent::Finished { file, summary } => {
                if !self.is_running(file) {
                    warn!("duplicate completion from {}", self.describe(file));
                    return Ok(());
                }
                self.states[file] = FileState::Finished;
                self.reported += 1;
                if let Some(staged) = self.staged.remove(&file) {
                    merge_into(&mut self.global, staged);
                }
                self.totals.lines += summary.lines;
                self.totals.parsed += summary.parsed;
                self.totals.malformed += summary.malformed;
                self.totals.chunks += summary.chunks;
            }
            WorkerEvent::Failed { file, error } => {
                if !self.is_running(file) {
                    warn!("late failure from {}: {}", self.describe(file), error);
                    return Ok(());
                }
                error!("{}", error);
                self.states[file] = FileState::Failed;
                self.reported += 1;
                self.staged.remove(&file);
                match self.policy {
                    FailurePolicy::FailFast => return Err(RunError::Worker(error)),
                    FailurePolicy::WaitAll => self.failures.push(error),
                }
            }
        }
        Ok(())
    }

    /// Marks every worker that never reported as failed. Used when the
    /// event channel closes early.
    pub fn close(&mut self) -> Result<(), RunError> {
        for file in 0..self.paths.len() {
            if self.is_running(file) {
                let error = CountError::WorkerFailure {
                    path: self.paths[file].clone(),
                    reason: "exited without reporting".to_owned(),
                };
                self.accept(WorkerEvent::Failed { file, error })?;
            }
        }
        Ok(())
    }

    /// Consumes the aggregator once every worker has reported.
    pub fn finish(mut self) -> Result<Aggregate, RunError> {
        self.close()?;
        if !self.failures.is_empty() {
            return Err(RunError::Failed {
                files: self.paths.len(),
                failures: mem::take(&mut self.failures),
                partial: mem::take(&mut self.global),
            });
        }
        Ok(Aggregate {
            frequency: self.global,
            totals: self.totals,
        })
    }

    fn is_running(&self, file: usize) -> bool {
        self.states.get(file) == Some(&FileState::Running)
    }

    fn describe(&self, file: usize) -> String {
        match self.paths.get(file) {
            Some(path) => path.display().to_string(),
            None => format!("unknown input #{}", file),
        }
    }
}
