//! Strictly ordered execution of validation requests
//!
//! Every validator owns one [`ValidationSequencer`]. Requests are appended to
//! an unbounded queue at the moment they are issued and drained by a single
//! worker task, so two requests of the same validator never overlap and they
//! run in the order they were issued. Validators of different entities each
//! have their own worker and run in parallel.

use crate::error::{ValidationError, ValidationResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type Step = BoxFuture<'static, ()>;

/// Lifecycle of a single request; there is no retry and no cancellation.
///
/// A request skipped after an earlier failure goes from `Queued` straight to `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestState {
    Queued = 0,
    Running = 1,
    Applied = 2,
    Completed = 3,
}

impl RequestState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Queued,
            1 => Self::Running,
            2 => Self::Applied,
            _ => Self::Completed,
        }
    }
}

#[derive(Debug)]
struct SequencerShared {
    /// Requests queued or running
    pending: AtomicUsize,
    /// Set when a request failed while `continue_on_failure` is off
    poisoned: AtomicBool,
    continue_on_failure: bool,
}

#[derive(Debug)]
struct Queue {
    sender: Option<mpsc::UnboundedSender<Step>>,
    next_ticket: u64,
}

/// One queued or running request.
///
/// Released when the job finishes or when it is dropped without running,
/// e.g. because the runtime driving the worker shut down.
struct PendingSlot {
    shared: Arc<SequencerShared>,
}

impl PendingSlot {
    fn acquire(shared: Arc<SequencerShared>) -> Self {
        shared.pending.fetch_add(1, Ordering::SeqCst);
        Self { shared }
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        if self.shared.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Queue drained, a new chain starts clean
            self.shared.poisoned.store(false, Ordering::SeqCst);
        }
    }
}

/// Serializes the validation requests of one validator
#[derive(Debug)]
pub struct ValidationSequencer {
    shared: Arc<SequencerShared>,
    queue: Mutex<Queue>,
}

impl ValidationSequencer {
    pub fn new(continue_on_failure: bool) -> Self {
        Self {
            shared: Arc::new(SequencerShared {
                pending: AtomicUsize::new(0),
                poisoned: AtomicBool::new(false),
                continue_on_failure,
            }),
            queue: Mutex::new(Queue {
                sender: None,
                next_ticket: 1,
            }),
        }
    }

    /// Whether any request is queued or running
    pub fn is_busy(&self) -> bool {
        self.shared.pending.load(Ordering::SeqCst) > 0
    }

    /// Number of requests queued or running
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Append `step` to the queue.
    ///
    /// Must be called from within a tokio runtime; the worker task is started
    /// on first use (and restarted if its runtime has gone away).
    pub fn submit<F, T>(&self, step: F) -> ValidationResult<ValidationHandle<T>>
    where
        F: Future<Output = ValidationResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut queue = self.queue.lock();
        let sender = Self::worker(&mut queue)?;

        let ticket = queue.next_ticket;
        queue.next_ticket += 1;

        let (result_tx, result_rx) = oneshot::channel();
        let state = Arc::new(AtomicU8::new(RequestState::Queued as u8));
        let shared = self.shared.clone();
        let step_state = state.clone();
        let slot = PendingSlot::acquire(self.shared.clone());

        let job = async move {
            let result = if !shared.continue_on_failure && shared.poisoned.load(Ordering::SeqCst) {
                debug!("Skipping validation request #{} after an earlier failure", ticket);
                Err(ValidationError::PriorStepFailed { ticket })
            } else {
                step_state.store(RequestState::Running as u8, Ordering::SeqCst);
                debug!("Running validation request #{}", ticket);
                let result = AssertUnwindSafe(step)
                    .catch_unwind()
                    .await
                    .unwrap_or(Err(ValidationError::Panicked));
                if let Err(ref error) = result {
                    warn!("Validation request #{} failed: {}", ticket, error);
                    shared.poisoned.store(true, Ordering::SeqCst);
                }
                step_state.store(RequestState::Applied as u8, Ordering::SeqCst);
                result
            };

            drop(slot);
            step_state.store(RequestState::Completed as u8, Ordering::SeqCst);
            debug!("Validation request #{} completed", ticket);
            let _ = result_tx.send(result);
        }
        .boxed();

        // A rejected job is dropped here and releases its slot
        if sender.send(job).is_err() {
            queue.sender = None;
            return Err(ValidationError::SequencerClosed);
        }

        Ok(ValidationHandle {
            ticket,
            state,
            receiver: result_rx,
        })
    }

    fn worker(queue: &mut Queue) -> ValidationResult<mpsc::UnboundedSender<Step>> {
        if let Some(sender) = queue.sender.as_ref().filter(|sender| !sender.is_closed()) {
            return Ok(sender.clone());
        }

        let runtime = Handle::try_current().map_err(|_| ValidationError::NoRuntime)?;
        let (sender, mut receiver) = mpsc::unbounded_channel::<Step>();
        runtime.spawn(async move {
            while let Some(step) = receiver.recv().await {
                step.await;
            }
            debug!("Validation worker stopped");
        });
        debug!("Started validation worker");

        queue.sender = Some(sender.clone());
        Ok(sender)
    }
}

/// Completion of one validation request.
///
/// Resolves once that request's writes have been applied. Dropping the handle
/// does not withdraw the request.
#[must_use = "a validation handle does nothing unless awaited"]
#[derive(Debug)]
pub struct ValidationHandle<T> {
    ticket: u64,
    state: Arc<AtomicU8>,
    receiver: oneshot::Receiver<ValidationResult<T>>,
}

impl<T> ValidationHandle<T> {
    /// Issue number of the request, increasing per validator
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn state(&self) -> RequestState {
        RequestState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Wait at most `duration`; the request itself keeps running to completion
    pub async fn timeout(self, duration: Duration) -> ValidationResult<T> {
        tokio::time::timeout(duration, self)
            .await
            .map_err(|_| ValidationError::Timeout)?
    }
}

impl<T> Future for ValidationHandle<T> {
    type Output = ValidationResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ValidationError::SequencerClosed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requests_run_in_issue_order_without_overlap() {
        let sequencer = ValidationSequencer::new(true);
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for (index, delay) in [30u64, 10, 0].into_iter().enumerate() {
            let log = log.clone();
            handles.push(
                sequencer
                    .submit(async move {
                        log.lock().push(format!("start {}", index));
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        log.lock().push(format!("end {}", index));
                        ValidationResult::Ok(index)
                    })
                    .unwrap(),
            );
        }

        assert!(sequencer.is_busy());
        let tickets: Vec<u64> = handles.iter().map(|h| h.ticket()).collect();
        assert!(tickets.windows(2).all(|pair| pair[0] < pair[1]));

        for (index, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), index);
        }

        assert_eq!(
            *log.lock(),
            vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
        );
        assert!(!sequencer.is_busy());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_the_chain() {
        let sequencer = ValidationSequencer::new(true);

        let failing = sequencer
            .submit(async { Err::<(), _>(ValidationError::Timeout) })
            .unwrap();
        let following = sequencer.submit(async { ValidationResult::Ok(7) }).unwrap();

        assert!(matches!(failing.await, Err(ValidationError::Timeout)));
        assert_eq!(following.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_fail_fast_rejects_queued_requests_until_drained() {
        let sequencer = ValidationSequencer::new(false);

        let failing = sequencer
            .submit(async { Err::<(), _>(ValidationError::Timeout) })
            .unwrap();
        let mut skipped = sequencer.submit(async { ValidationResult::Ok(1) }).unwrap();
        let skipped_ticket = skipped.ticket();

        assert!(failing.await.is_err());
        assert!(matches!(
            (&mut skipped).await,
            Err(ValidationError::PriorStepFailed { ticket }) if ticket == skipped_ticket
        ));
        assert_eq!(skipped.state(), RequestState::Completed);

        // Queue drained, the next chain runs normally
        assert_eq!(sequencer.submit(async { ValidationResult::Ok(2) }).unwrap().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_panicking_step_fails_only_its_request() {
        let sequencer = ValidationSequencer::new(true);

        let panicking = sequencer
            .submit(async {
                if true {
                    panic!("rule bug");
                }
                ValidationResult::Ok(())
            })
            .unwrap();
        let following = sequencer.submit(async { ValidationResult::Ok("still running") }).unwrap();

        assert!(matches!(panicking.await, Err(ValidationError::Panicked)));
        assert_eq!(following.await.unwrap(), "still running");
    }

    #[tokio::test]
    async fn test_handle_states_and_timeout() {
        let sequencer = ValidationSequencer::new(true);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let blocking = sequencer
            .submit(async move {
                let _ = release_rx.await;
                ValidationResult::Ok(())
            })
            .unwrap();
        let queued = sequencer.submit(async { ValidationResult::Ok(()) }).unwrap();
        assert_eq!(queued.state(), RequestState::Queued);

        // Waiting on our own handle times out, but the request is not withdrawn
        assert!(matches!(
            queued.timeout(Duration::from_millis(10)).await,
            Err(ValidationError::Timeout)
        ));
        assert_eq!(sequencer.pending(), 2);
        assert_eq!(blocking.state(), RequestState::Running);

        release_tx.send(()).unwrap();
        blocking.await.unwrap();
        let mut last = sequencer.submit(async { ValidationResult::Ok(()) }).unwrap();
        (&mut last).await.unwrap();
        assert_eq!(last.state(), RequestState::Completed);
        assert!(!sequencer.is_busy());
    }

    fn current_thread_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_slots_released_when_runtime_shuts_down() {
        let sequencer = ValidationSequencer::new(false);

        let first = current_thread_runtime();
        let (running, queued) = first.block_on(async {
            let running = sequencer
                .submit(async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    ValidationResult::Ok(())
                })
                .unwrap();
            let queued = sequencer.submit(async { ValidationResult::Ok(()) }).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(running.state(), RequestState::Running);
            (running, queued)
        });
        assert_eq!(sequencer.pending(), 2);

        // Worker, running step and queued step all go away with the runtime
        drop(first);
        assert!(!sequencer.is_busy());

        let second = current_thread_runtime();
        second.block_on(async {
            assert!(matches!(running.await, Err(ValidationError::SequencerClosed)));
            assert!(matches!(queued.await, Err(ValidationError::SequencerClosed)));

            let next = sequencer.submit(async { ValidationResult::Ok(5) }).unwrap();
            assert_eq!(next.await.unwrap(), 5);
        });
        assert!(!sequencer.is_busy());
    }

    #[test]
    fn test_submit_without_runtime() {
        let sequencer = ValidationSequencer::new(true);
        let result = sequencer.submit(async { ValidationResult::Ok(()) });
        assert!(matches!(result, Err(ValidationError::NoRuntime)));
        assert!(!sequencer.is_busy());
    }
}
