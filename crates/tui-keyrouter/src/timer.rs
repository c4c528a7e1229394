//! Single-slot deferred timer backing sequence disambiguation.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Slot {
    /// Deadline and the generation it was armed for.
    armed: Option<(Instant, u64)>,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    slot: Mutex<Slot>,
    wake: Condvar,
}

/// One worker thread holding at most one armed deadline.
///
/// Arming replaces any previous deadline. On expiry the callback receives
/// the generation it was armed with; the owner decides whether that
/// generation is still current.
pub(crate) struct DeferredTimer {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl DeferredTimer {
    pub(crate) fn spawn<F>(on_fire: F) -> io::Result<Self>
    where
        F: Fn(u64) + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("keyrouter-timer".to_string())
            .spawn(move || run(&worker_shared, on_fire))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    pub(crate) fn arm(&self, after: Duration, generation: u64) {
        let mut slot = self.shared.slot.lock();
        slot.armed = Some((Instant::now() + after, generation));
        self.shared.wake.notify_one();
    }

    pub(crate) fn cancel(&self) {
        let mut slot = self.shared.slot.lock();
        if slot.armed.take().is_some() {
            self.shared.wake.notify_one();
        }
    }
}

fn run<F: Fn(u64)>(shared: &Shared, on_fire: F) {
    let mut slot = shared.slot.lock();
    loop {
        if slot.shutdown {
            return;
        }
        let armed = slot.armed;
        match armed {
            None => shared.wake.wait(&mut slot),
            Some((deadline, generation)) if Instant::now() >= deadline => {
                slot.armed = None;
                // The callback takes the dispatch lock; never hold the slot
                // lock across it.
                MutexGuard::unlocked(&mut slot, || on_fire(generation));
            }
            Some((deadline, _)) => {
                shared.wake.wait_until(&mut slot, deadline);
            }
        }
    }
}

impl Drop for DeferredTimer {
    fn drop(&mut self) {
        self.shared.slot.lock().shutdown = true;
        self.shared.wake.notify_one();

        if let Some(worker) = self.worker.take() {
            // The last handle can be released from inside a fired handler,
            // i.e. on the worker itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}
