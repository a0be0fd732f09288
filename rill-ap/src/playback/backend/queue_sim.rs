//! Simulated hardware-queue backend
//!
//! Mirrors a platform audio API that owns a per-source buffer queue and
//! consumes it asynchronously. Nothing is consumed on its own: the caller
//! advances playback with [`QueueBackend::consume_chunks`] or
//! [`QueueBackend::consume_bytes`], which makes every interleaving between
//! the device and the update tick reproducible.

use super::{impl_pool_backend, VoiceHandle, VoicePool, VoiceState};
use crate::audio::types::ChunkRef;
use std::sync::Arc;

/// Hardware-queue simulation with explicit consumption
#[derive(Debug)]
pub struct QueueBackend {
    pool: VoicePool,
}

impl QueueBackend {
    pub fn new(voice_count: usize) -> Self {
        Self {
            pool: VoicePool::new(voice_count),
        }
    }

    /// Voices currently allocated
    pub fn voices_in_use(&self) -> usize {
        self.pool.in_use()
    }

    /// Hardware queues convert rates themselves
    fn mix_rate(&self) -> Option<u32> {
        None
    }

    /// Play `count` whole chunks of a playing voice
    pub fn consume_chunks(&mut self, voice: VoiceHandle, count: usize) {
        if let Some(v) = self.pool.get_mut(voice) {
            for _ in 0..count {
                if v.state != VoiceState::Playing {
                    break;
                }
                v.finish_head();
            }
        }
    }

    /// Play `bytes` of a playing voice, crossing chunk boundaries
    pub fn consume_bytes(&mut self, voice: VoiceHandle, mut bytes: usize) {
        let Some(v) = self.pool.get_mut(voice) else {
            return;
        };

        while bytes > 0 && v.state == VoiceState::Playing {
            let finished = {
                let Some(head) = v.pending.front_mut() else {
                    break;
                };
                let frame_bytes = head.chunk.format().frame_bytes();
                let offset = head.frame * frame_bytes;
                let left = head.chunk.len() - offset.min(head.chunk.len());
                let step = left.min(bytes);
                head.frame += step / frame_bytes;
                bytes -= step;
                step == left
            };
            if finished {
                v.finish_head();
            }
            if bytes < 2 {
                break;
            }
        }
    }

    /// Drop every queued chunk, as a backend that reclaims finished buffers
    /// by itself would after a full drain
    pub fn reclaim_all(&mut self, voice: VoiceHandle) {
        if let Some(v) = self.pool.get_mut(voice) {
            v.pending.clear();
            v.processed.clear();
            v.state = VoiceState::Stopped;
        }
    }

    /// Chunks still waiting to be played, oldest first
    pub fn pending_chunks(&self, voice: VoiceHandle) -> Vec<ChunkRef> {
        self.pool
            .get(voice)
            .map(|v| v.pending.iter().map(|q| Arc::clone(&q.chunk)).collect())
            .unwrap_or_default()
    }

    /// Current voice state, `None` for an unallocated handle
    pub fn voice_state(&self, voice: VoiceHandle) -> Option<VoiceState> {
        self.pool.get(voice).map(|v| v.state)
    }

    /// Gain last set on the voice
    pub fn voice_gain(&self, voice: VoiceHandle) -> Option<f32> {
        self.pool.get(voice).map(|v| v.gain)
    }
}

impl_pool_backend!(QueueBackend);
