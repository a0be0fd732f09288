//! Polling update thread
//!
//! Owns the fixed-interval tick in polling mode. With an output ring attached
//! it also pre-mixes audio: each interval the thread tops up the lock-free
//! ring in whole quanta, refilling every Player's ring before each one, and
//! the device callback only pops samples from it.

use crate::error::Result;
use crate::playback::backend::{SoftwareMixer, VoiceBackend};
use crate::playback::manager::PlaybackManager;
use ringbuf::traits::{Observer, Producer};
use ringbuf::HeapProd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Background thread calling [`PlaybackManager::tick`] at a fixed interval
///
/// Stopped and joined by [`UpdateThread::shutdown`] or on drop.
pub struct UpdateThread {
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl UpdateThread {
    /// Tick `manager` every `interval`
    pub fn spawn<B: VoiceBackend + 'static>(manager: PlaybackManager<B>, interval: Duration) -> Result<Self> {
        Self::start(interval, move |dt| manager.tick(dt))
    }

    /// Tick `manager` every `interval` and keep `output` filled with mixed
    /// samples
    ///
    /// # Arguments
    /// * `manager` - Manager over the software mixer
    /// * `output` - Producer half of the ring the device callback reads
    /// * `interval` - Tick interval
    /// * `quantum` - Samples (not frames) mixed per `mix_audio` call
    pub fn spawn_with_output(
        manager: PlaybackManager<SoftwareMixer>,
        mut output: HeapProd<f32>,
        interval: Duration,
        quantum: usize,
    ) -> Result<Self> {
        let quantum = quantum.max(1);
        let mut scratch = vec![0.0f32; quantum];

        Self::start(interval, move |dt| {
            // Elapsed time is applied once; later quanta only refill
            let mut step_dt = dt;
            let mut mixed = 0;
            while output.vacant_len() >= quantum {
                manager.tick_and_mix(step_dt, &mut scratch);
                output.push_slice(&scratch);
                step_dt = 0.0;
                mixed += 1;
            }

            if mixed == 0 {
                manager.tick(dt);
            } else {
                trace!("Pre-mixed {} quanta", mixed);
            }
        })
    }

    fn start<F>(interval: Duration, mut step: F) -> Result<Self>
    where
        F: FnMut(f32) + Send + 'static,
    {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop_flag);

        let handle = thread::Builder::new()
            .name("rill-update".to_string())
            .spawn(move || {
                debug!("Update thread started ({:?} interval)", interval);
                let mut last = Instant::now();

                while !flag.load(Ordering::Relaxed) {
                    let now = Instant::now();
                    let dt = now.duration_since(last).as_secs_f32();
                    last = now;

                    step(dt);

                    let elapsed = now.elapsed();
                    if elapsed < interval {
                        thread::sleep(interval - elapsed);
                    }
                }

                debug!("Update thread exiting");
            })?;

        info!("Update thread running every {} ms", interval.as_millis());
        Ok(Self {
            stop_flag,
            thread: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Signal the thread and wait for it to exit
    pub fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("Update thread panicked");
            }
        }
    }
}

impl Drop for UpdateThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
