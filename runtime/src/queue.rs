// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared work queue of crawl tasks.
//!
//! Tracks outstanding work (queued plus running). When the last task is
//! done the queue closes itself and every waiting worker wakes up with
//! `None`.

use crate::session::CrawlPath;
use stateflow::StateId;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Replay `path` from the entry URL, then keep crawling `target`.
#[derive(Debug, Clone)]
pub struct CrawlTask {
    pub path: CrawlPath,
    pub target: StateId,
}

impl CrawlTask {
    /// Task crawling the root state.
    pub fn root() -> Self {
        Self {
            path: CrawlPath::new(),
            target: StateId::ROOT,
        }
    }

    pub fn new(path: CrawlPath, target: StateId) -> Self {
        Self { path, target }
    }
}

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<CrawlTask>,
    outstanding: usize,
    closed: bool,
}

#[derive(Default)]
pub struct CrawlQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl CrawlQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a task. Returns false once the queue is closed.
    pub fn submit(&self, task: CrawlTask) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.tasks.push_back(task);
            state.outstanding += 1;
        }
        self.notify.notify_one();
        true
    }

    /// Wait for the next task. `None` once the queue is closed.
    pub async fn next(&self) -> Option<CrawlTask> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if let Some(task) = state.tasks.pop_front() {
                    return Some(task);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark one task taken with [`next`](Self::next) as finished.
    pub fn task_done(&self) {
        let finished = {
            let mut state = self.lock();
            state.outstanding = state.outstanding.saturating_sub(1);
            if state.outstanding == 0 && !state.closed {
                state.closed = true;
                true
            } else {
                false
            }
        };
        if finished {
            tracing::debug!("all crawl tasks finished");
            self.notify.notify_waiters();
        }
    }

    /// Reject further submissions and drop queued tasks. Running tasks
    /// still report through [`task_done`](Self::task_done).
    pub fn close(&self) {
        let dropped = {
            let mut state = self.lock();
            let dropped = state.tasks.len();
            state.tasks.clear();
            state.outstanding = state.outstanding.saturating_sub(dropped);
            state.closed = true;
            dropped
        };
        if dropped > 0 {
            tracing::info!(dropped, "crawl queue closed with pending tasks");
        }
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    pub fn pending(&self) -> usize {
        self.lock().tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_closes_when_work_runs_out() {
        let q = CrawlQueue::new();
        assert!(q.submit(CrawlTask::root()));
        let task = q.next().await.unwrap();
        assert_eq!(task.target, StateId::ROOT);

        // a running task may spawn more work
        assert!(q.submit(CrawlTask::new(CrawlPath::new(), StateId(3))));
        q.task_done();
        assert!(!q.is_closed());

        let sibling = q.next().await.unwrap();
        assert_eq!(sibling.target, StateId(3));
        q.task_done();
        assert!(q.is_closed());
        assert!(q.next().await.is_none());
        assert!(!q.submit(CrawlTask::root()));
    }

    #[tokio::test]
    async fn test_close_discards_pending() {
        let q = CrawlQueue::new();
        q.submit(CrawlTask::root());
        q.submit(CrawlTask::root());
        let _running = q.next().await.unwrap();
        q.close();
        assert_eq!(q.pending(), 0);
        assert_eq!(q.outstanding(), 1);
        assert!(q.next().await.is_none());
        q.task_done();
        assert_eq!(q.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_waiting_workers_wake_on_completion() {
        let q = Arc::new(CrawlQueue::new());
        q.submit(CrawlTask::root());
        let first = q.next().await.unwrap();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let q = Arc::clone(&q);
                tokio::spawn(async move { q.next().await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        q.task_done();
        for w in waiters {
            let got = tokio::time::timeout(Duration::from_secs(1), w).await.unwrap().unwrap();
            assert!(got.is_none());
        }
    }

    #[tokio::test]
    async fn test_waiting_worker_receives_submitted_task() {
        let q = Arc::new(CrawlQueue::new());
        q.submit(CrawlTask::root());
        let _first = q.next().await.unwrap();

        let waiter = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.next().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.submit(CrawlTask::new(CrawlPath::new(), StateId(1)));
        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.unwrap().target, StateId(1));
    }
}
