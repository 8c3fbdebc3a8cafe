//! Job Queue
//!
//! The default delivery of triggers is synchronous: a write re-runs every
//! dependent effect before it returns, and two writes re-run a shared
//! subscriber twice. Effects created with [`Scheduler::Queued`] opt out of
//! that and land here instead.
//!
//! # Algorithm
//!
//! 1. Queueing a job that is already pending is a no-op, so any number of
//!    triggers between two flushes collapse into one run.
//! 2. Pending jobs are kept sorted by id. Effect ids grow in creation order,
//!    so a parent component's render job runs before its children's.
//! 3. A flush drains the queue, including jobs queued while it runs.
//! 4. A job re-entering the queue more than `recursion_limit` times within
//!    one flush is dropped and reported as
//!    [`ReactivityError::RecursionLimit`].
//!
//! Nothing flushes on its own. Call [`Runtime::flush_jobs`], or await
//! [`Runtime::next_tick`] from async code.
//!
//! [`Scheduler::Queued`]: super::Scheduler::Queued

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, error};

use crate::error::ReactivityError;

use super::runtime::Runtime;

/// A unit of deferred work.
#[derive(Clone)]
pub struct Job {
    id: u64,
    task: Rc<dyn Fn()>,
}

impl Job {
    pub fn new<F>(id: u64, task: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self {
            id,
            task: Rc::new(task),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish()
    }
}

#[derive(Default)]
pub(crate) struct JobQueue {
    pending: VecDeque<Job>,
    flushing: bool,
}

impl JobQueue {
    fn insert(&mut self, job: Job) -> bool {
        match self.pending.binary_search_by_key(&job.id, |j| j.id) {
            Ok(_) => false,
            Err(pos) => {
                self.pending.insert(pos, job);
                true
            }
        }
    }
}

/// Resets the flushing flag even if a job panics.
struct FlushGuard<'a>(&'a Runtime);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.inner().queue.borrow_mut().flushing = false;
    }
}

impl Runtime {
    /// Queue a job for the next flush. Returns false if it was already pending.
    pub fn queue_job(&self, job: Job) -> bool {
        self.inner().queue.borrow_mut().insert(job)
    }

    pub fn pending_jobs(&self) -> usize {
        self.inner().queue.borrow().pending.len()
    }

    /// Run every pending job, including jobs queued along the way.
    ///
    /// Returns the number of jobs executed. A nested call made from inside a
    /// job returns 0; the outer flush picks up whatever was queued.
    pub fn flush_jobs(&self) -> usize {
        {
            let mut queue = self.inner().queue.borrow_mut();
            if queue.flushing || queue.pending.is_empty() {
                return 0;
            }
            queue.flushing = true;
        }
        let _guard = FlushGuard(self);

        let limit = self.config().recursion_limit;
        let mut seen: HashMap<u64, usize> = HashMap::new();
        let mut ran = 0;

        loop {
            let job = self.inner().queue.borrow_mut().pending.pop_front();
            let Some(job) = job else { break };

            let count = seen.entry(job.id).or_insert(0);
            *count += 1;
            if *count > limit {
                let err = ReactivityError::RecursionLimit { job: job.id, limit };
                error!(%err, "dropping job");
                continue;
            }

            (job.task)();
            ran += 1;
        }

        debug!(jobs = ran, "flushed");
        ran
    }

    /// Yield to the async executor, then flush.
    pub async fn next_tick(&self) {
        tokio::task::yield_now().await;
        self.flush_jobs();
    }
}
