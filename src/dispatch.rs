//! Job dispatch under backpressure
//!
//! A single dispatcher produces jobs with sequence IDs 0, 1, 2, ... into a
//! bounded multi-consumer queue. When the queue is full the dispatcher is
//! suspended until a worker takes a job, so dispatch can never run more than
//! `capacity` jobs ahead of the workers. On cancellation the queue is closed
//! and every worker observes end-of-stream.

use async_channel::{Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One unit of dispatch work
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Job {
    pub sequence_id: u64,
}

/// Create the bounded job queue shared by the dispatcher and all workers
pub fn job_queue(capacity: usize) -> (Sender<Job>, Receiver<Job>) {
    async_channel::bounded(capacity.max(1))
}

/// Producer of monotonically increasing jobs
pub struct JobDispatcher {
    sender: Sender<Job>,
    cancel: CancellationToken,
}

impl JobDispatcher {
    pub fn new(sender: Sender<Job>, cancel: CancellationToken) -> Self {
        Self { sender, cancel }
    }

    /// Dispatch jobs until cancelled or until every receiver is gone
    ///
    /// Returns the number of jobs handed to the queue. The queue is always
    /// closed on return.
    pub async fn run(self) -> u64 {
        let mut next_id = 0u64;

        loop {
            let job = Job {
                sequence_id: next_id,
            };

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!(dispatched = next_id, "Dispatcher cancelled");
                    break;
                }

                sent = self.sender.send(job) => {
                    if sent.is_err() {
                        debug!(dispatched = next_id, "Job queue closed, dispatcher stopping");
                        break;
                    }
                    next_id += 1;
                }
            }
        }

        self.sender.close();
        next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_jobs_are_sequential() {
        let (tx, rx) = job_queue(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(JobDispatcher::new(tx, cancel.clone()).run());

        let mut ids = Vec::new();
        for _ in 0..10 {
            ids.push(rx.recv().await.unwrap().sequence_id);
        }
        cancel.cancel();

        assert_eq!(ids, (0..10).collect::<Vec<u64>>());
        assert!(handle.await.unwrap() >= 10);
    }

    #[tokio::test]
    async fn test_backpressure_blocks_when_queue_is_full() {
        let workers = 3;
        let capacity = 2 * workers;
        let (tx, rx) = job_queue(capacity);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(JobDispatcher::new(tx, cancel.clone()).run());

        // Nobody consumes: the dispatcher must park on a full queue.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(rx.len(), capacity);
        assert!(!handle.is_finished());

        cancel.cancel();
        let dispatched = handle.await.unwrap();
        assert_eq!(dispatched, capacity as u64);
        assert!(rx.is_closed());
    }

    #[tokio::test]
    async fn test_cancellation_closes_queue() {
        let (tx, rx) = job_queue(2);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let dispatched = JobDispatcher::new(tx, cancel).run().await;
        assert_eq!(dispatched, 0);
        assert!(rx.recv().await.is_err());
    }

    #[tokio::test]
    async fn test_stops_when_receivers_dropped() {
        let (tx, rx) = job_queue(2);
        drop(rx);

        let dispatched = JobDispatcher::new(tx, CancellationToken::new()).run().await;
        assert_eq!(dispatched, 0);
    }
}
