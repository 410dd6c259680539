use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{RuntimeError, RuntimeResult};

/// Periodic worker with an explicit cancellation signal.
///
/// Runs `tick` once per interval on a named thread until stopped. Stopping
/// (or dropping) the pacer raises the cancellation flag and joins the
/// thread, so the tick never outlives its owner.
pub struct Pacer {
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Pacer {
    pub fn spawn<F>(interval: Duration, mut tick: F) -> RuntimeResult<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let worker = thread::Builder::new()
            .name("tricam-pacer".into())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    tick();
                    thread::sleep(interval);
                }
            })
            .map_err(|err| RuntimeError::Spawn {
                name: "pacer",
                message: err.to_string(),
            })?;
        Ok(Self {
            shutdown,
            worker: Some(worker),
        })
    }

    /// Cancel the pacer and join its thread.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Pacer {
    fn drop(&mut self) {
        self.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn pacer_ticks_and_stops_on_signal() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let pacer = Pacer::spawn(Duration::from_millis(1), move || {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
        while ticks.load(Ordering::Relaxed) == 0 {
            thread::yield_now();
        }
        pacer.stop();
        let after_stop = ticks.load(Ordering::Relaxed);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(ticks.load(Ordering::Relaxed), after_stop);
    }
}
