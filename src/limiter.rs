use crate::Error;
use futures::future::BoxFuture;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};

#[cfg(feature = "tracing")]
use tracing::debug;

type Job = Box<dyn FnOnce(OwnedSemaphorePermit) -> BoxFuture<'static, ()> + Send>;

/// Admits at most `max_concurrent` submitted tasks at a time.
///
/// Submissions queue in FIFO order. A slot is handed to the next queued task
/// as soon as any running task finishes, including by panicking.
pub struct Limiter {
    queue: mpsc::UnboundedSender<Job>,
    slots: Arc<Semaphore>,
    max_concurrent: usize,
}

/// Handle to one submission's outcome
pub struct Submission<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for Submission<T> {
    type Output = Result<T, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map_err(|_| Error::TaskAborted)
    }
}

impl Limiter {
    /// Create a limiter. Must be called from within a tokio runtime.
    pub fn new(max_concurrent: usize) -> Result<Self, Error> {
        if max_concurrent == 0 {
            return Err(Error::Config(
                "concurrency limit must be at least 1".to_string(),
            ));
        }

        let slots = Arc::new(Semaphore::new(max_concurrent));
        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(rx, Arc::clone(&slots)));

        Ok(Self {
            queue,
            slots,
            max_concurrent,
        })
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of tasks currently admitted
    pub fn running(&self) -> usize {
        self.max_concurrent - self.slots.available_permits()
    }

    /// Queue `producer`; it is invoked once a slot frees up.
    pub fn submit<F, Fut, T>(&self, producer: F) -> Submission<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |permit| {
            Box::pin(async move {
                let output = producer().await;
                drop(permit);
                let _ = tx.send(output);
            })
        });

        // A closed queue drops `job` and its sender, so the handle resolves
        // to `TaskAborted`.
        let _ = self.queue.send(job);
        Submission { rx }
    }
}

async fn dispatch(mut rx: mpsc::UnboundedReceiver<Job>, slots: Arc<Semaphore>) {
    while let Some(job) = rx.recv().await {
        let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
            break;
        };
        debug!(
            "Admitting task ({} slots left)",
            slots.available_permits()
        );
        tokio::spawn(job(permit));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_zero_concurrency_is_rejected() {
        assert!(matches!(Limiter::new(0), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_submission_resolves_with_own_output() {
        let limiter = Limiter::new(2).unwrap();
        let a = limiter.submit(|| async { 1 });
        let b = limiter.submit(|| async { 2 });
        assert_eq!(a.await.unwrap(), 1);
        assert_eq!(b.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_panicking_task_releases_its_slot() {
        let limiter = Limiter::new(1).unwrap();
        let bad = limiter.submit(|| async {
            if true {
                panic!("producer blew up");
            }
            0
        });
        let good = limiter.submit(|| async { 7 });

        assert!(matches!(bad.await, Err(Error::TaskAborted)));
        assert_eq!(good.await.unwrap(), 7);
        assert_eq!(limiter.running(), 0);
    }

    #[tokio::test]
    async fn test_fifo_admission_with_single_slot() {
        let limiter = Limiter::new(1).unwrap();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let order = Arc::clone(&order);
                limiter.submit(move || async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    order.lock().unwrap().push(i);
                })
            })
            .collect();
        futures::future::join_all(handles).await;

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_running_reflects_admitted_tasks() {
        let limiter = Limiter::new(3).unwrap();
        let started = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let started = Arc::clone(&started);
                let gate = Arc::clone(&gate);
                limiter.submit(move || async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    let _pass = gate.acquire().await;
                })
            })
            .collect();

        while started.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(limiter.running(), 3);
        assert_eq!(started.load(Ordering::SeqCst), 3);

        gate.add_permits(5);
        futures::future::join_all(handles).await;
        assert_eq!(started.load(Ordering::SeqCst), 5);
    }
}
