//! Per-conversation debounced response scheduling.
//!
//! Humans type multi-message thoughts; responding to each message
//! individually is both spammy and wasteful. Every qualifying trigger
//! cancels the conversation's pending task and starts a fresh one, so at
//! most one task is live per conversation id. Cancellation is cooperative
//! and observed at the debounce sleep boundary: a task that has already
//! started its work runs to completion (providers are not guaranteed to
//! support mid-flight abort), so duplicate delivery in rare races is
//! tolerated rather than prevented.
//!
//! Task lifecycle: Idle -> Waiting -> Running -> Idle, with
//! Waiting -> Idle on cancellation as the only other exit.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.2.0

use dashmap::DashMap;
use log::debug;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::sleep;

struct Pending {
    cancel: oneshot::Sender<()>,
    seq: u64,
}

/// Maps conversation id -> the one outstanding debounced task
#[derive(Default)]
pub struct ResponseScheduler {
    pending: DashMap<u64, Pending>,
    seq: AtomicU64,
}

impl ResponseScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `work` to run after `delay`, superseding any task already
    /// pending for `conversation_id`
    pub fn schedule<F>(self: &Arc<Self>, conversation_id: u64, delay: Duration, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);

        // Cancel-then-replace
        if let Some((_, previous)) = self.pending.remove(&conversation_id) {
            debug!("Superseding pending response for conversation {conversation_id}");
            let _ = previous.cancel.send(());
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.pending.insert(
            conversation_id,
            Pending {
                cancel: cancel_tx,
                seq,
            },
        );

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel_rx => {
                    // Superseded while waiting; the canceller already
                    // removed our map entry
                    return;
                }
                _ = sleep(delay) => {}
            }

            // Past the cancellation checkpoint: run to completion
            work.await;

            // Only remove our own entry, never a replacement's
            scheduler
                .pending
                .remove_if(&conversation_id, |_, p| p.seq == seq);
        });
    }

    /// Number of conversations with a task currently pending or running
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_single_trigger_runs_once() {
        let scheduler = Arc::new(ResponseScheduler::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        scheduler.schedule(1, Duration::from_millis(10), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_newer_trigger_supersedes_pending() {
        let scheduler = Arc::new(ResponseScheduler::new());
        let observed = Arc::new(AtomicUsize::new(0));

        // Trigger A, then trigger B before A's debounce elapses: exactly
        // one generation, using B's state
        let a = observed.clone();
        scheduler.schedule(1, Duration::from_millis(50), async move {
            a.store(1, Ordering::SeqCst);
        });
        sleep(Duration::from_millis(5)).await;
        let b = observed.clone();
        scheduler.schedule(1, Duration::from_millis(50), async move {
            b.store(2, Ordering::SeqCst);
        });

        sleep(Duration::from_millis(200)).await;
        assert_eq!(observed.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_conversations_are_independent() {
        let scheduler = Arc::new(ResponseScheduler::new());
        let runs = Arc::new(AtomicUsize::new(0));

        for channel in [1_u64, 2, 3] {
            let counter = runs.clone();
            scheduler.schedule(channel, Duration::from_millis(10), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_running_task_is_not_torn_down() {
        let scheduler = Arc::new(ResponseScheduler::new());
        let runs = Arc::new(AtomicUsize::new(0));

        // First task passes its cancellation checkpoint, then a new
        // trigger arrives: both complete (duplicate tolerated, not torn down)
        let a = runs.clone();
        scheduler.schedule(1, Duration::from_millis(10), async move {
            sleep(Duration::from_millis(80)).await;
            a.fetch_add(1, Ordering::SeqCst);
        });
        sleep(Duration::from_millis(40)).await;
        let b = runs.clone();
        scheduler.schedule(1, Duration::from_millis(10), async move {
            b.fetch_add(1, Ordering::SeqCst);
        });

        sleep(Duration::from_millis(200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.pending_count(), 0);
    }
}
