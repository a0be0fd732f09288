//! Voice backend interface
//!
//! Every platform backend implements [`VoiceBackend`]; the buffer ring and
//! the player state machine are written once against it.
//!
//! # Queue Semantics
//!
//! Backends follow hardware-queue counting rules (the OpenAL model):
//! - `queued_count` counts every chunk handed over and not yet unqueued,
//!   including chunks already played
//! - `processed_count` counts chunks fully played, or every queued chunk
//!   once the voice is stopped
//! - `unqueue_chunks` only removes processed chunks
//! - a playing voice whose queue runs dry stops on its own
//!
//! Two implementations ship: [`SoftwareMixer`] mixes voices into an output
//! buffer pulled by the device callback, and [`QueueBackend`] simulates a
//! hardware queue whose consumption is driven explicitly.

pub mod queue_sim;
pub mod software_mix;

pub use queue_sim::QueueBackend;
pub use software_mix::SoftwareMixer;

use crate::audio::types::ChunkRef;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{trace, warn};

/// Opaque handle to a backend voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle(u32);

impl VoiceHandle {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }
}

/// Capability interface each backend implements
pub trait VoiceBackend: Send {
    /// Take a voice from the pool; `None` when the pool is exhausted
    fn allocate_voice(&mut self) -> Option<VoiceHandle>;

    /// Stop the voice, drop its queue and return it to the pool
    fn release_voice(&mut self, voice: VoiceHandle);

    /// Chunks handed to the voice and not yet unqueued
    fn queued_count(&self, voice: VoiceHandle) -> usize;

    /// Queued chunks the voice has finished with
    fn processed_count(&self, voice: VoiceHandle) -> usize;

    /// Append chunks to the voice's play queue, in order
    fn queue_chunks(&mut self, voice: VoiceHandle, chunks: &[ChunkRef]);

    /// Remove processed chunks from the voice's queue
    fn unqueue_chunks(&mut self, voice: VoiceHandle, chunks: &[ChunkRef]);

    fn play(&mut self, voice: VoiceHandle);

    fn pause(&mut self, voice: VoiceHandle);

    /// Stop playback; every queued chunk becomes processed
    fn stop(&mut self, voice: VoiceHandle);

    fn is_playing(&self, voice: VoiceHandle) -> bool;

    /// Linear gain applied while mixing or by the hardware
    fn set_gain(&mut self, voice: VoiceHandle, gain: f32);

    /// Read position in bytes inside the oldest unprocessed chunk
    fn byte_offset(&self, voice: VoiceHandle) -> usize;

    /// Move the read position inside the oldest unprocessed chunk
    fn set_byte_offset(&mut self, voice: VoiceHandle, offset: usize);

    /// Sample rate every queued chunk must already be at, if the backend
    /// cannot play other rates itself
    fn output_rate(&self) -> Option<u32>;
}

/// Playback state of one voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// A chunk queued on a voice with its read cursor
#[derive(Debug)]
pub(crate) struct QueuedChunk {
    pub chunk: ChunkRef,
    /// Next frame to play
    pub frame: usize,
}

/// Per-voice queue bookkeeping shared by the bundled backends
#[derive(Debug)]
pub(crate) struct VoiceQueue {
    pub pending: VecDeque<QueuedChunk>,
    pub processed: VecDeque<ChunkRef>,
    pub state: VoiceState,
    pub gain: f32,
}

impl VoiceQueue {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            processed: VecDeque::new(),
            state: VoiceState::Initial,
            gain: 1.0,
        }
    }

    pub fn queued(&self) -> usize {
        self.pending.len() + self.processed.len()
    }

    pub fn queue(&mut self, chunks: &[ChunkRef]) {
        for chunk in chunks {
            self.pending.push_back(QueuedChunk {
                chunk: Arc::clone(chunk),
                frame: 0,
            });
        }
    }

    /// Remove each requested chunk from the processed list
    pub fn unqueue(&mut self, chunks: &[ChunkRef]) {
        for chunk in chunks {
            match self.processed.iter().position(|c| Arc::ptr_eq(c, chunk)) {
                Some(at) => {
                    self.processed.remove(at);
                }
                None => warn!("Ignoring unqueue of a chunk that is not processed"),
            }
        }
    }

    pub fn play(&mut self) {
        if self.state == VoiceState::Stopped || self.state == VoiceState::Initial {
            // Restarting a stopped voice replays whatever is still queued
            while let Some(chunk) = self.processed.pop_back() {
                self.pending.push_front(QueuedChunk { chunk, frame: 0 });
            }
            if let Some(head) = self.pending.front_mut() {
                head.frame = 0;
            }
        }
        self.state = if self.pending.is_empty() {
            VoiceState::Stopped
        } else {
            VoiceState::Playing
        };
    }

    pub fn pause(&mut self) {
        if self.state == VoiceState::Playing {
            self.state = VoiceState::Paused;
        }
    }

    pub fn stop(&mut self) {
        while let Some(queued) = self.pending.pop_front() {
            self.processed.push_back(queued.chunk);
        }
        self.state = VoiceState::Stopped;
    }

    /// Move the head chunk to the processed list; stops a drained voice
    pub fn finish_head(&mut self) {
        if let Some(done) = self.pending.pop_front() {
            self.processed.push_back(done.chunk);
        }
        if self.pending.is_empty() && self.state == VoiceState::Playing {
            trace!("Voice queue drained");
            self.state = VoiceState::Stopped;
        }
    }

    pub fn byte_offset(&self) -> usize {
        self.pending
            .front()
            .map(|head| head.frame * head.chunk.format().frame_bytes())
            .unwrap_or(0)
    }

    pub fn set_byte_offset(&mut self, offset: usize) {
        if let Some(head) = self.pending.front_mut() {
            let frame_bytes = head.chunk.format().frame_bytes();
            head.frame = (offset / frame_bytes).min(head.chunk.frames());
        }
    }
}

/// Fixed-size pool of voices addressed by handle
#[derive(Debug)]
pub(crate) struct VoicePool {
    slots: Vec<Option<VoiceQueue>>,
}

impl VoicePool {
    pub fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| None).collect(),
        }
    }

    pub fn allocate(&mut self) -> Option<VoiceHandle> {
        let index = self.slots.iter().position(Option::is_none)?;
        self.slots[index] = Some(VoiceQueue::new());
        Some(VoiceHandle::new(index as u32))
    }

    pub fn release(&mut self, voice: VoiceHandle) {
        match self.slots.get_mut(voice.id() as usize) {
            Some(slot) => *slot = None,
            None => warn!("Release of unknown voice {}", voice.id()),
        }
    }

    pub fn get(&self, voice: VoiceHandle) -> Option<&VoiceQueue> {
        self.slots.get(voice.id() as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, voice: VoiceHandle) -> Option<&mut VoiceQueue> {
        self.slots.get_mut(voice.id() as usize).and_then(Option::as_mut)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut VoiceQueue> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// Implements [`VoiceBackend`] for a backend type holding a `pool: VoicePool`
///
/// Only the consumption side differs between the bundled backends, so the
/// queue bookkeeping is generated once.
macro_rules! impl_pool_backend {
    ($backend:ty) => {
        impl $crate::playback::backend::VoiceBackend for $backend {
            fn allocate_voice(&mut self) -> Option<$crate::playback::backend::VoiceHandle> {
                let voice = self.pool.allocate();
                if voice.is_none() {
                    tracing::debug!("Voice pool exhausted ({} voices)", self.pool.capacity());
                }
                voice
            }

            fn release_voice(&mut self, voice: $crate::playback::backend::VoiceHandle) {
                self.pool.release(voice);
            }

            fn queued_count(&self, voice: $crate::playback::backend::VoiceHandle) -> usize {
                self.pool.get(voice).map(|v| v.queued()).unwrap_or(0)
            }

            fn processed_count(&self, voice: $crate::playback::backend::VoiceHandle) -> usize {
                self.pool.get(voice).map(|v| v.processed.len()).unwrap_or(0)
            }

            fn queue_chunks(
                &mut self,
                voice: $crate::playback::backend::VoiceHandle,
                chunks: &[$crate::audio::types::ChunkRef],
            ) {
                if let Some(v) = self.pool.get_mut(voice) {
                    v.queue(chunks);
                }
            }

            fn unqueue_chunks(
                &mut self,
                voice: $crate::playback::backend::VoiceHandle,
                chunks: &[$crate::audio::types::ChunkRef],
            ) {
                if let Some(v) = self.pool.get_mut(voice) {
                    v.unqueue(chunks);
                }
            }

            fn play(&mut self, voice: $crate::playback::backend::VoiceHandle) {
                if let Some(v) = self.pool.get_mut(voice) {
                    v.play();
                }
            }

            fn pause(&mut self, voice: $crate::playback::backend::VoiceHandle) {
                if let Some(v) = self.pool.get_mut(voice) {
                    v.pause();
                }
            }

            fn stop(&mut self, voice: $crate::playback::backend::VoiceHandle) {
                if let Some(v) = self.pool.get_mut(voice) {
                    v.stop();
                }
            }

            fn is_playing(&self, voice: $crate::playback::backend::VoiceHandle) -> bool {
                self.pool
                    .get(voice)
                    .map(|v| v.state == $crate::playback::backend::VoiceState::Playing)
                    .unwrap_or(false)
            }

            fn set_gain(&mut self, voice: $crate::playback::backend::VoiceHandle, gain: f32) {
                if let Some(v) = self.pool.get_mut(voice) {
                    v.gain = gain;
                }
            }

            fn byte_offset(&self, voice: $crate::playback::backend::VoiceHandle) -> usize {
                self.pool.get(voice).map(|v| v.byte_offset()).unwrap_or(0)
            }

            fn set_byte_offset(&mut self, voice: $crate::playback::backend::VoiceHandle, offset: usize) {
                if let Some(v) = self.pool.get_mut(voice) {
                    v.set_byte_offset(offset);
                }
            }

            fn output_rate(&self) -> Option<u32> {
                <$backend>::mix_rate(self)
            }
        }
    };
}

pub(crate) use impl_pool_backend;
