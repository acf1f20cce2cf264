//! Per-driver polling thread.
//!
//! Sampled and event-driven backends get one background thread that feeds
//! their ring buffer. While the device is closed the thread parks; while it
//! is open it waits for the next tick (or the next [`EventQueue`] event),
//! then calls the backend's [`Sampler`](crate::driver::Sampler) until it
//! reports no more data.
//!
//! Stopping sets a flag, wakes the thread wherever it sleeps, and joins it,
//! so the caller never proceeds while the thread can still touch the
//! registration being torn down.

use crate::error::{LircError, Result};
use crate::registry::Irctl;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

#[derive(Debug, Default)]
struct PollControl {
    stop: AtomicBool,
    lock: Mutex<()>,
    kick: Condvar,
}

impl PollControl {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn wake(&self) {
        let _guard = self.lock.lock();
        self.kick.notify_all();
    }

    /// Park until stopped or `ready` holds.
    fn park_until(&self, ready: impl Fn() -> bool) {
        let mut guard = self.lock.lock();
        while !self.stopped() && !ready() {
            self.kick.wait(&mut guard);
        }
    }

    /// Sleep for `interval`, returning early when stopped or kicked.
    fn sleep(&self, interval: Duration) {
        let deadline = Instant::now() + interval;
        let mut guard = self.lock.lock();
        if !self.stopped() {
            let _ = self.kick.wait_until(&mut guard, deadline);
        }
    }
}

/// Handle to a running polling thread.
#[derive(Debug)]
pub struct PollingThread {
    control: Arc<PollControl>,
    handle: Option<JoinHandle<()>>,
    irctl: Arc<Irctl>,
}

impl PollingThread {
    /// Start the thread for `irctl`.
    ///
    /// Fails with [`LircError::ChildProcessFailed`] if the OS refuses to
    /// spawn it, or [`LircError::BadRequest`] if the registration has no
    /// sampler.
    pub(crate) fn spawn(irctl: Arc<Irctl>) -> Result<Self> {
        let sampler = irctl
            .sampler
            .clone()
            .ok_or_else(|| LircError::bad_request("polling thread needs a sampler"))?;
        let control = Arc::new(PollControl::default());

        let thread_control = Arc::clone(&control);
        let thread_irctl = Arc::clone(&irctl);
        let handle = thread::Builder::new()
            .name(format!("lirc_dev{}", irctl.minor))
            .spawn(move || {
                let ir = thread_irctl;
                let control = thread_control;
                let mut seen = ir.event_queue.as_ref().map_or(0, |q| q.generation());

                debug!(minor = ir.minor, name = %ir.name, "Polling thread started");

                while !control.stopped() {
                    if !ir.is_open() {
                        control.park_until(|| ir.is_open());
                        continue;
                    }

                    match (&ir.poll_interval, &ir.event_queue) {
                        (Some(interval), _) => control.sleep(*interval),
                        (None, Some(queue)) => queue.wait(&mut seen, &control.stop),
                        (None, None) => break,
                    }
                    if control.stopped() {
                        break;
                    }

                    let mut added = false;
                    loop {
                        match sampler.sample(&ir.buffer) {
                            Ok(()) => {
                                added = true;
                                if ir.buffer.is_full() {
                                    break;
                                }
                            }
                            Err(LircError::NoDevice { .. }) => {
                                debug!(minor = ir.minor, "Backend reported device gone");
                                if added {
                                    ir.buffer.wake_all();
                                }
                                debug!(minor = ir.minor, "Polling thread exiting");
                                return;
                            }
                            Err(LircError::NoData) => break,
                            Err(e) => {
                                trace!(minor = ir.minor, error = %e, "Sample failed");
                                break;
                            }
                        }
                    }
                    if added {
                        ir.buffer.wake_all();
                    }
                }

                debug!(minor = ir.minor, "Polling thread exiting");
            })
            .map_err(|e| LircError::ChildProcessFailed {
                message: e.to_string(),
            })?;

        Ok(Self {
            control,
            handle: Some(handle),
            irctl,
        })
    }

    /// Wake the thread so it re-checks the open state.
    pub(crate) fn wake(&self) {
        self.control.wake();
    }

    /// True while the thread has not exited.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop and join the thread.
    pub(crate) fn stop(&mut self) {
        self.control.stop.store(true, Ordering::SeqCst);
        self.control.wake();
        if let Some(queue) = &self.irctl.event_queue {
            queue.wake();
        }

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.join() {
                error!("Polling thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for PollingThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}
