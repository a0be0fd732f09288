//! Streaming buffer ring
//!
//! A ring of fixed-capacity PCM chunks owned by one streamed Player. Chunks
//! are filled from the Player's decoder, handed to the voice, and refilled
//! only after the backend reports them processed.
//!
//! ## Design
//!
//! ```text
//!            next ──┐
//!                   ▼
//!   slot:   [ 0 ] [ 1 ] [ 2 ]
//!            ▲
//!   oldest ──┘  = next - queued   (first slot the voice will finish)
//! ```
//!
//! - `next` is the slot refilled and queued next
//! - the voice consumes queued slots oldest first
//! - a slot is written only while the ring holds the sole reference to it,
//!   so a chunk can never be refilled while the backend still reads it
//!
//! The update never assumes `processed + free == ring size` at the moment of
//! sampling: the backend drains asynchronously, and every mismatch is handled
//! by refilling what was reported and recovering when the voice ran dry.

use crate::audio::decoder::Decoder;
use crate::audio::types::{ChunkRef, PcmChunk, PcmFormat};
use crate::playback::backend::{VoiceBackend, VoiceHandle};
use crate::playback::ring_index::RingIndex;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Outcome of one ring update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingUpdate {
    /// Nothing was processed since the last update
    Idle,

    /// `n` processed slots were refilled and queued again
    Refilled(usize),

    /// The voice had drained every chunk; refilled slots were queued and the
    /// voice restarted
    Resynced(usize),

    /// Nothing was queued: the ring was refilled from stream start and the
    /// voice restarted
    Recovered,

    /// The stream ended (not looping) and every chunk has been played
    Exhausted,
}

/// Ring of PCM chunks fed from one decoder
pub struct BufferRing {
    decoder: Box<dyn Decoder>,
    slots: Vec<ChunkRef>,
    chunk_size: usize,
    next: RingIndex,
    /// A fill reached end of stream while not looping
    exhausted: bool,
    /// Bytes of fully played chunks since the last start fill
    played_bytes: usize,
    /// Loop boundaries crossed (decoder rewinds) since creation
    loop_count: u64,
    name: String,
}

impl BufferRing {
    /// Create a ring of `count` chunks of `chunk_size` bytes
    ///
    /// # Panics
    /// Panics if `count` is zero
    pub fn new(decoder: Box<dyn Decoder>, count: usize, chunk_size: usize, name: impl Into<String>) -> Self {
        let format = decoder.format();
        let slots = (0..count)
            .map(|_| Arc::new(PcmChunk::with_capacity(format, chunk_size)))
            .collect();

        Self {
            decoder,
            slots,
            chunk_size,
            next: RingIndex::zero(count),
            exhausted: false,
            played_bytes: 0,
            loop_count: 0,
            name: name.into(),
        }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot that will be refilled and queued next
    pub fn next_slot(&self) -> usize {
        self.next.get()
    }

    /// Chunk in `slot`
    pub fn chunk(&self, slot: usize) -> &ChunkRef {
        &self.slots[slot]
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// PCM format of the chunks, after any rate conversion
    pub fn format(&self) -> PcmFormat {
        self.decoder.format()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Decoder rewinds performed at loop boundaries
    pub fn loop_count(&self) -> u64 {
        self.loop_count
    }

    /// Bytes of fully played chunks since the ring was last started
    pub fn played_bytes(&self) -> usize {
        self.played_bytes
    }

    /// Decode into `slot` until its chunk is full
    ///
    /// On end of stream a looping ring rewinds the decoder and keeps filling;
    /// otherwise the chunk is left short. A decode error is logged and ends
    /// the fill for this call; without looping it also ends the stream.
    /// Returns the bytes written, 0 only once the stream is exhausted and not
    /// looping.
    pub fn fill_buffer(&mut self, slot: RingIndex, looping: bool) -> usize {
        let chunk_size = self.chunk_size;
        let slot_ref = &mut self.slots[slot.get()];
        if Arc::strong_count(slot_ref) > 1 {
            // Only reachable when a backend kept a chunk it reported processed
            warn!(
                "Slot {} of '{}' is still referenced by the backend, detaching",
                slot.get(),
                self.name
            );
        }
        let storage = Arc::make_mut(slot_ref).storage_mut();
        storage.clear();
        if self.exhausted && !looping {
            return 0;
        }
        storage.resize(chunk_size, 0);

        let mut size = 0;
        let mut just_rewound = false;
        while size < chunk_size {
            match self.decoder.read(&mut storage[size..]) {
                Ok(n) if n > 0 => {
                    size += n;
                    just_rewound = false;
                }
                Ok(_) => {
                    if !looping {
                        self.exhausted = true;
                        break;
                    }
                    if just_rewound {
                        // A stream that yields nothing right after a rewind
                        // would spin forever
                        warn!("Looping stream '{}' produced no data after rewind", self.name);
                        break;
                    }
                    if let Err(e) = self.decoder.reset_to_start() {
                        warn!("Failed to rewind '{}': {}", self.name, e);
                        break;
                    }
                    self.loop_count += 1;
                    just_rewound = true;
                    trace!("'{}' looped ({} loops)", self.name, self.loop_count);
                }
                Err(e) => {
                    warn!("Error while filling buffer for '{}': {}", self.name, e);
                    if !looping {
                        self.exhausted = true;
                    }
                    break;
                }
            }
        }

        storage.truncate(size);
        size
    }

    /// Rewind the decoder and fill every slot in order
    ///
    /// Resets the next-slot cursor to 0. Returns the total bytes written.
    pub fn fill_start_buffers(&mut self, looping: bool) -> usize {
        if let Err(e) = self.decoder.reset_to_start() {
            warn!("Failed to rewind '{}': {}", self.name, e);
        }
        self.exhausted = false;
        self.played_bytes = 0;

        let len = self.slots.len();
        let mut total = 0;
        for slot in RingIndex::zero(len).iter(len) {
            total += self.fill_buffer(slot, looping);
        }
        self.next = RingIndex::zero(len);

        debug!("Filled start buffers of '{}' ({} bytes)", self.name, total);
        total
    }

    /// Queue `count` slots starting at `start`, splitting at the wrap
    pub fn queue<B: VoiceBackend + ?Sized>(
        &self,
        start: RingIndex,
        count: usize,
        backend: &mut B,
        voice: VoiceHandle,
    ) {
        let (tail, head) = start.split(count);
        if !tail.is_empty() {
            backend.queue_chunks(voice, &self.slots[tail]);
        }
        if !head.is_empty() {
            backend.queue_chunks(voice, &self.slots[head]);
        }
    }

    /// Unqueue `count` slots starting at `start`, splitting at the wrap
    pub fn unqueue<B: VoiceBackend + ?Sized>(
        &self,
        start: RingIndex,
        count: usize,
        backend: &mut B,
        voice: VoiceHandle,
    ) {
        let (tail, head) = start.split(count);
        if !tail.is_empty() {
            backend.unqueue_chunks(voice, &self.slots[tail]);
        }
        if !head.is_empty() {
            backend.unqueue_chunks(voice, &self.slots[head]);
        }
    }

    /// Queue every slot starting at slot 0
    pub fn queue_all<B: VoiceBackend + ?Sized>(&self, backend: &mut B, voice: VoiceHandle) {
        self.queue(RingIndex::zero(self.slots.len()), self.slots.len(), backend, voice);
    }

    /// Unqueue everything the voice still holds
    ///
    /// The voice must be stopped first so that every chunk counts as
    /// processed.
    pub fn unqueue_all<B: VoiceBackend + ?Sized>(&self, backend: &mut B, voice: VoiceHandle) {
        let queued = backend.queued_count(voice).min(self.slots.len());
        self.unqueue(self.next.back(queued), queued, backend, voice);
    }

    /// Refill and requeue what the voice has finished with
    ///
    /// Called once per tick while the owning Player is playing.
    pub fn update<B: VoiceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        voice: VoiceHandle,
        looping: bool,
    ) -> RingUpdate {
        let len = self.slots.len();
        let queued = backend.queued_count(voice).min(len);

        if queued == 0 {
            if self.exhausted {
                return RingUpdate::Exhausted;
            }
            // Every chunk drained and was reclaimed before this tick saw it
            warn!("Underrun on '{}': nothing queued, refilling ring", self.name);
            backend.stop(voice);
            self.fill_start_buffers(looping);
            self.queue_all(backend, voice);
            backend.play(voice);
            return RingUpdate::Recovered;
        }

        let processed = backend.processed_count(voice).min(queued);
        if processed == 0 {
            return RingUpdate::Idle;
        }

        let oldest = self.next.back(queued);
        self.played_bytes += oldest.iter(processed).map(|slot| self.slots[slot.get()].len()).sum::<usize>();
        self.unqueue(oldest, processed, backend, voice);

        let mut refilled = 0;
        let mut bytes = 0;
        for slot in self.next.iter(processed) {
            let written = self.fill_buffer(slot, looping);
            if written == 0 {
                break;
            }
            refilled += 1;
            bytes += written;
        }

        if bytes == 0 {
            trace!("'{}' has no more data ({} chunks still queued)", self.name, queued - processed);
            if self.exhausted && backend.queued_count(voice) == 0 {
                return RingUpdate::Exhausted;
            }
            return RingUpdate::Refilled(0);
        }

        self.queue(self.next, refilled, backend, voice);
        self.next = self.next.wrapping_add(refilled);

        if processed == queued {
            // The voice ran dry and stopped itself; restart it on the new data
            debug!("'{}' drained before refill, restarting voice", self.name);
            backend.pause(voice);
            backend.play(voice);
            return RingUpdate::Resynced(refilled);
        }

        RingUpdate::Refilled(refilled)
    }
}

impl std::fmt::Debug for BufferRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferRing")
            .field("name", &self.name)
            .field("slots", &self.slots.len())
            .field("chunk_size", &self.chunk_size)
            .field("next", &self.next.get())
            .field("exhausted", &self.exhausted)
            .field("loop_count", &self.loop_count)
            .finish()
    }
}
