//! Hand-off of the newest snapshot from a collector to its consumer.

use crate::exec::cancelled;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::runtime::{Builder, Handle};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type Callback<T> = Arc<dyn Fn(Arc<T>) + Send + Sync>;

/// A single-threaded executor on which every callback runs, away from the
/// polling tasks.
#[derive(Clone)]
pub struct DeliveryContext {
    handle: Handle,
    _owner: Option<Arc<ThreadOwner>>,
}

struct ThreadOwner {
    _stop: oneshot::Sender<()>,
}

impl DeliveryContext {
    /// Starts the `snapshot-delivery` thread. It runs until the last clone
    /// of the context is dropped.
    pub fn spawn() -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        thread::Builder::new()
            .name("snapshot-delivery".to_string())
            .spawn(move || {
                runtime.block_on(async {
                    let _ = stop_rx.await;
                });
                debug!("snapshot delivery thread finished");
            })?;
        Ok(Self {
            handle,
            _owner: Some(Arc::new(ThreadOwner { _stop: stop_tx })),
        })
    }

    /// Delivers on the runtime the caller is running in.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(|handle| Self {
            handle,
            _owner: None,
        })
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }
}

/// Producer side of a [`SnapshotBus`].
pub struct Publisher<T> {
    tx: Arc<watch::Sender<Option<Arc<T>>>>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> Publisher<T> {
    /// Replaces the pending value. A value the consumer has not seen yet is
    /// overwritten, never queued.
    pub fn publish(&self, value: T) {
        self.tx.send_replace(Some(Arc::new(value)));
    }
}

struct Delivery {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Replace-latest channel between one collector and one callback.
pub struct SnapshotBus<T> {
    tx: Arc<watch::Sender<Option<Arc<T>>>>,
    callback: Callback<T>,
    delivery: Mutex<Option<Delivery>>,
}

impl<T: Send + Sync + 'static> SnapshotBus<T> {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(Arc<T>) + Send + Sync + 'static,
    {
        let (tx, _) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            callback: Arc::new(callback),
            delivery: Mutex::new(None),
        }
    }

    pub fn publisher(&self) -> Publisher<T> {
        Publisher {
            tx: Arc::clone(&self.tx),
        }
    }

    /// Starts delivering values published from now on. No-op when open.
    pub fn open(&self, ctx: &DeliveryContext) {
        let mut delivery = self.delivery.lock().unwrap_or_else(|e| e.into_inner());
        if delivery.is_some() {
            return;
        }
        let (stop, stop_rx) = watch::channel(false);
        let rx = self.tx.subscribe();
        let callback = Arc::clone(&self.callback);
        let task = ctx.handle().spawn(deliver(rx, stop_rx, callback));
        *delivery = Some(Delivery { stop, task });
    }

    /// Stops delivery. A value that was published but not yet handed over is
    /// dropped; a callback already running is waited for.
    ///
    /// Must not be awaited from inside the callback itself.
    pub async fn close(&self) {
        let delivery = self
            .delivery
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(Delivery { stop, task }) = delivery else {
            return;
        };
        let _ = stop.send(true);
        if let Err(err) = task.await {
            if err.is_panic() {
                warn!(error = %err, "snapshot callback panicked");
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.delivery
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// The most recently published value, delivered or not.
    pub fn latest(&self) -> Option<Arc<T>> {
        self.tx.borrow().clone()
    }
}

async fn deliver<T>(
    mut rx: watch::Receiver<Option<Arc<T>>>,
    mut stop: watch::Receiver<bool>,
    callback: Callback<T>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancelled(&mut stop) => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let value = rx.borrow_and_update().clone();
                if *stop.borrow() {
                    break;
                }
                if let Some(value) = value {
                    callback(value);
                }
            }
        }
    }
}
