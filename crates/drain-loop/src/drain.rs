//! Drain Loop Implementation

use parking_lot::Mutex;
use ring_buffer::{RingBuffer, RingBufferError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use crate::{DrainConfig, DrainError, Sink, SinkError};

/// Lifecycle state of a [`DrainLoop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DrainState {
    /// No background thread is draining
    Stopped = 0,
    /// The background thread is draining chunks
    Running = 1,
    /// `stop()` has been requested and is waiting for the thread to exit
    Stopping = 2,
}

impl DrainState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Snapshot of drain loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Chunks read from the ring and handed to the sink
    pub iterations: u64,
    /// Chunks the sink accepted in full
    pub chunks_written: u64,
    /// Samples the sink accepted
    pub samples_written: u64,
    /// Samples the sink did not accept and that were discarded
    pub samples_dropped: u64,
    /// Chunks the sink accepted only partly
    pub partial_writes: u64,
    /// Sink calls that returned an error
    pub sink_errors: u64,
}

#[derive(Default)]
struct Counters {
    iterations: AtomicU64,
    chunks_written: AtomicU64,
    samples_written: AtomicU64,
    samples_dropped: AtomicU64,
    partial_writes: AtomicU64,
    sink_errors: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DrainStats {
        DrainStats {
            iterations: self.iterations.load(Ordering::Relaxed),
            chunks_written: self.chunks_written.load(Ordering::Relaxed),
            samples_written: self.samples_written.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            partial_writes: self.partial_writes.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
        }
    }
}

/// State shared with the background thread
struct Shared {
    state: AtomicU8,
    stop_requested: AtomicBool,
    counters: Counters,
    fatal: Mutex<Option<SinkError>>,
}

impl Shared {
    fn state(&self) -> DrainState {
        DrainState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: DrainState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Background drain loop feeding a sink from a ring buffer.
///
/// `start()` spawns exactly one named thread that repeatedly blocks on
/// `RingBuffer::read` for one chunk and hands it to the sink outside the
/// ring lock. `stop()` raises the stop flag, interrupts the ring so a parked
/// read returns, joins the thread and then calls `Sink::on_stop`.
///
/// The stop flag is checked once per iteration, after the sink call and
/// before the next read.
pub struct DrainLoop<T> {
    ring: Arc<RingBuffer<T>>,
    sink: Arc<dyn Sink<T>>,
    config: DrainConfig,
    shared: Arc<Shared>,
    /// Also serializes `start` and `stop`
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Copy + Default + Send + 'static> DrainLoop<T> {
    /// Create a stopped drain loop
    pub fn new(
        ring: Arc<RingBuffer<T>>,
        sink: Arc<dyn Sink<T>>,
        config: DrainConfig,
    ) -> Result<Self, DrainError> {
        let chunk_size = config.chunk_size();
        if chunk_size == 0 || chunk_size > ring.capacity() {
            return Err(DrainError::InvalidChunkSize {
                chunk_size,
                capacity: ring.capacity(),
            });
        }

        debug!(
            "Drain loop for sink '{}' created: {} samples per chunk, ring capacity {}",
            sink.name(),
            chunk_size,
            ring.capacity()
        );

        Ok(Self {
            ring,
            sink,
            config,
            shared: Arc::new(Shared {
                state: AtomicU8::new(DrainState::Stopped as u8),
                stop_requested: AtomicBool::new(false),
                counters: Counters::default(),
                fatal: Mutex::new(None),
            }),
            handle: Mutex::new(None),
        })
    }

    /// Start draining. Does nothing if already running.
    ///
    /// If the previous run stopped itself on a fatal sink error that was
    /// never taken, that error is returned instead and the loop stays
    /// stopped; the next call starts a fresh run.
    pub fn start(&self) -> Result<(), DrainError> {
        let mut handle = self.handle.lock();

        if self.shared.state() == DrainState::Running {
            debug!("Drain loop for sink '{}' already running", self.sink.name());
            return Ok(());
        }

        // A previous run ended on its own; reap it and report why.
        if let Some(finished) = handle.take() {
            self.shutdown(finished)?;
        }

        self.ring.resume();
        self.shared.stop_requested.store(false, Ordering::SeqCst);
        *self.shared.fatal.lock() = None;

        self.sink
            .on_start()
            .map_err(|e| DrainError::sink(self.sink.name(), e))?;

        let ring = Arc::clone(&self.ring);
        let sink = Arc::clone(&self.sink);
        let shared = Arc::clone(&self.shared);
        let chunk_size = self.config.chunk_size();

        self.shared.set_state(DrainState::Running);
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || run(ring, sink, shared, chunk_size));

        match spawned {
            Ok(join) => {
                *handle = Some(join);
                info!(
                    "Drain loop started for sink '{}' ({} samples per chunk)",
                    self.sink.name(),
                    chunk_size
                );
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(DrainState::Stopped);
                if let Err(stop_err) = self.sink.on_stop() {
                    warn!("Sink '{}' teardown failed: {}", self.sink.name(), stop_err);
                }
                Err(DrainError::Spawn(e))
            }
        }
    }

    /// Stop draining and wait for the background thread to exit.
    ///
    /// Returns the fatal sink error if the loop had already stopped itself
    /// because of one.
    pub fn stop(&self) -> Result<(), DrainError> {
        let mut handle = self.handle.lock();
        match handle.take() {
            Some(join) => self.shutdown(join),
            None => Ok(()),
        }
    }

    fn shutdown(&self, join: JoinHandle<()>) -> Result<(), DrainError> {
        info!("Stopping drain loop for sink '{}'", self.sink.name());

        if self.shared.state() == DrainState::Running {
            self.shared.set_state(DrainState::Stopping);
        }
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        self.ring.interrupt();

        let joined = join.join();
        self.shared.set_state(DrainState::Stopped);

        let teardown = self.sink.on_stop();
        let fatal = self.shared.fatal.lock().take();

        if joined.is_err() {
            error!("Drain thread for sink '{}' panicked", self.sink.name());
            return Err(DrainError::ThreadPanicked);
        }

        if let Some(fatal) = fatal {
            if let Err(e) = teardown {
                warn!("Sink '{}' teardown failed: {}", self.sink.name(), e);
            }
            return Err(DrainError::sink(self.sink.name(), fatal));
        }

        teardown.map_err(|e| DrainError::sink(self.sink.name(), e))?;
        info!("Drain loop stopped for sink '{}'", self.sink.name());
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> DrainState {
        self.shared.state()
    }

    /// Check if the background thread is draining
    pub fn is_running(&self) -> bool {
        self.state() == DrainState::Running
    }

    /// Snapshot of the loop counters
    pub fn stats(&self) -> DrainStats {
        self.shared.counters.snapshot()
    }

    /// Take the fatal error that stopped the loop, if any
    pub fn take_fatal_error(&self) -> Option<SinkError> {
        self.shared.fatal.lock().take()
    }

    /// Samples pulled from the ring per iteration
    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size()
    }

    /// The ring this loop drains
    pub fn ring(&self) -> &Arc<RingBuffer<T>> {
        &self.ring
    }
}

impl<T> Drop for DrainLoop<T> {
    fn drop(&mut self) {
        if let Some(join) = self.handle.get_mut().take() {
            self.shared.stop_requested.store(true, Ordering::SeqCst);
            self.ring.interrupt();
            let _ = join.join();
            self.shared.set_state(DrainState::Stopped);
            if let Err(e) = self.sink.on_stop() {
                warn!("Sink '{}' teardown failed on drop: {}", self.sink.name(), e);
            }
        }
    }
}

/// Body of the drain thread
fn run<T: Copy + Default>(
    ring: Arc<RingBuffer<T>>,
    sink: Arc<dyn Sink<T>>,
    shared: Arc<Shared>,
    chunk_size: usize,
) {
    let mut chunk = vec![T::default(); chunk_size];
    let counters = &shared.counters;

    loop {
        match ring.read(&mut chunk) {
            Ok(_) => {}
            Err(RingBufferError::Interrupted { available, .. }) => {
                if shared.stop_requested.load(Ordering::SeqCst) {
                    debug!("Drain read interrupted for shutdown ({} samples left)", available);
                } else {
                    warn!("Ring buffer interrupted outside shutdown, exiting drain loop");
                    shared.set_state(DrainState::Stopped);
                }
                break;
            }
            Err(e) => {
                warn!("Unexpected ring read error: {}", e);
                break;
            }
        }

        counters.iterations.fetch_add(1, Ordering::Relaxed);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| sink.write_chunk(&chunk)))
            .unwrap_or_else(|payload| {
                Err(SinkError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            });

        match outcome {
            Ok(accepted) if accepted >= chunk_size => {
                counters.chunks_written.fetch_add(1, Ordering::Relaxed);
                counters.samples_written.fetch_add(chunk_size as u64, Ordering::Relaxed);
                metrics::counter!("drain_loop_chunks_written_total").increment(1);
                metrics::counter!("drain_loop_samples_written_total").increment(chunk_size as u64);
                trace!("Sink '{}' accepted {} samples", sink.name(), chunk_size);
            }
            Ok(accepted) => {
                let dropped = chunk_size - accepted;
                counters.partial_writes.fetch_add(1, Ordering::Relaxed);
                counters.samples_written.fetch_add(accepted as u64, Ordering::Relaxed);
                counters.samples_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
                metrics::counter!("drain_loop_samples_written_total").increment(accepted as u64);
                metrics::counter!("drain_loop_samples_dropped_total").increment(dropped as u64);
                warn!(
                    "Sink '{}' accepted {} of {} samples, dropping {}",
                    sink.name(),
                    accepted,
                    chunk_size,
                    dropped
                );
            }
            Err(e) if e.is_fatal() => {
                counters.sink_errors.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("drain_loop_sink_errors_total").increment(1);
                error!("Sink '{}' failed fatally, stopping drain loop: {}", sink.name(), e);
                *shared.fatal.lock() = Some(e);
                let _ = shared.state.compare_exchange(
                    DrainState::Running as u8,
                    DrainState::Stopped as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                break;
            }
            Err(e) => {
                counters.sink_errors.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("drain_loop_sink_errors_total").increment(1);
                warn!("Sink '{}' write failed: {}", sink.name(), e);
            }
        }

        if shared.stop_requested.load(Ordering::SeqCst) {
            break;
        }
    }

    debug!("Drain thread for sink '{}' exiting", sink.name());
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
