//! The typed job registry (§5): `activeJobs`, `cancelSignals`, and
//! `history` behind one reader-writer lock, exactly as the REDESIGN FLAGS
//! call for in place of a thread-pool-plus-dict-of-mutable-jobs design.

use std::collections::{HashMap, VecDeque};

use crate::cancel::CancellationToken;
use crate::job::JobProgress;

struct ActiveJob {
    progress: JobProgress,
    cancel: CancellationToken,
}

pub struct Registry {
    active: HashMap<String, ActiveJob>,
    history: VecDeque<JobProgress>,
    history_limit: usize,
}

impl Registry {
    pub fn new(history_limit: usize) -> Self {
        Self { active: HashMap::new(), history: VecDeque::new(), history_limit }
    }

    pub fn insert_active(&mut self, progress: JobProgress, cancel: CancellationToken) {
        self.active.insert(progress.job_id.clone(), ActiveJob { progress, cancel });
    }

    /// `CancelJob`: signals the job's cancel flag; `false` if not active.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.active.get(job_id) {
            Some(job) => {
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancellation_token(&self, job_id: &str) -> Option<CancellationToken> {
        self.active.get(job_id).map(|j| j.cancel.clone())
    }

    /// `GetJob`: checks the active set, then history.
    pub fn get(&self, job_id: &str) -> Option<JobProgress> {
        if let Some(job) = self.active.get(job_id) {
            return Some(job.progress.clone());
        }
        self.history.iter().find(|p| p.job_id == job_id).cloned()
    }

    pub fn active_jobs(&self) -> Vec<JobProgress> {
        self.active.values().map(|j| j.progress.clone()).collect()
    }

    pub fn history(&self, limit: usize) -> Vec<JobProgress> {
        self.history.iter().rev().take(limit).cloned().collect()
    }

    pub fn mutate<R>(&mut self, job_id: &str, f: impl FnOnce(&mut JobProgress) -> R) -> Option<R> {
        self.active.get_mut(job_id).map(|j| f(&mut j.progress))
    }

    /// §4.9 step 5: remove from the active set, keep in the bounded LRU
    /// history.
    pub fn retire(&mut self, job_id: &str) -> Option<JobProgress> {
        let job = self.active.remove(job_id)?;
        self.history.push_back(job.progress.clone());
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
        Some(job.progress)
    }
}
