//! Bulkhead: bounds concurrent in-flight operations with an optional wait queue.

use crate::context::Context;
use crate::error::ExecutorError;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

type AdmissionGate = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone)]
pub struct BulkheadPolicy {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    queue_size: usize,
    queued: Arc<AtomicUsize>,
    max_wait: Duration,
    admission_gate: Option<AdmissionGate>,
}

impl BulkheadPolicy {
    /// No wait queue: `try_acquire` only, reject immediately when full.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            queue_size: 0,
            queued: Arc::new(AtomicUsize::new(0)),
            max_wait: Duration::ZERO,
            admission_gate: None,
        }
    }

    /// Installs an external predicate consulted before every permit acquisition:
    /// while it returns `true`, admission is refused with the same `BulkheadFull`
    /// outcome as a saturated semaphore, without ever acquiring a permit. Lets a
    /// caller reject on a signal outside raw concurrency (e.g. a reported load
    /// factor) while still sharing the bulkhead's single admission point, so the
    /// rejection flows through the same emission and accounting as a real one.
    pub fn with_admission_gate(mut self, gate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.admission_gate = Some(Arc::new(gate));
        self
    }

    /// A large but bounded concurrency limit, for callers that don't want a bulkhead
    /// at all but still want to go through the same execution path.
    pub fn unlimited() -> Self {
        Self::new(1_000_000_000)
    }

    /// Adds a bounded wait queue: callers that find the bulkhead full wait up to
    /// `max_wait` for a permit instead of failing immediately, as long as fewer than
    /// `queue_size` callers are already waiting.
    pub fn with_queue(mut self, queue_size: usize, max_wait: Duration) -> Self {
        self.queue_size = queue_size;
        self.max_wait = max_wait;
        self
    }

    fn in_flight(&self) -> usize {
        self.max_concurrent.saturating_sub(self.semaphore.available_permits())
    }

    pub async fn execute<T, E, Fut, Op>(
        &self,
        ctx: &Context,
        mut operation: Op,
    ) -> Result<T, ExecutorError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ExecutorError<E>>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        if let Some(gate) = &self.admission_gate {
            if gate() {
                return Err(ExecutorError::BulkheadFull { in_flight: self.in_flight(), max: self.max_concurrent });
            }
        }

        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) if self.queue_size == 0 => {
                return Err(ExecutorError::BulkheadFull { in_flight: self.in_flight(), max: self.max_concurrent });
            }
            Err(_) => {
                let waiting = self.queued.fetch_add(1, Ordering::AcqRel) + 1;
                if waiting > self.queue_size {
                    self.queued.fetch_sub(1, Ordering::AcqRel);
                    return Err(ExecutorError::BulkheadFull { in_flight: self.in_flight(), max: self.max_concurrent });
                }

                let semaphore = self.semaphore.clone();
                let acquired = ctx.race(semaphore.acquire_owned()).await;
                self.queued.fetch_sub(1, Ordering::AcqRel);

                match acquired {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => unreachable!("semaphore never closes"),
                    Err(crate::context::ExpiryKind::Cancelled) => return Err(ExecutorError::Cancelled),
                    Err(crate::context::ExpiryKind::Timeout) => {
                        return Err(ExecutorError::BulkheadFull { in_flight: self.in_flight(), max: self.max_concurrent })
                    }
                }
            }
        };

        let result = operation().await;
        drop(permit);
        result
    }
}
