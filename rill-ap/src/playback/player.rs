//! Player state machine
//!
//! One Player is one playback instance of a Sound on one voice.
//!
//! # States
//!
//! ```text
//!            play                 pause
//! Stopped ─────────► Playing ─────────────► Paused
//!    ▲                 │  ▲                   │
//!    │ stop / fade end │  │ fade completes    │ play
//!    │                 ▼  │                   ▼
//!    └───────────── FadingOut            Playing / FadingIn
//! ```
//!
//! `FadingIn` is `Playing` with the fade factor ramping up. `FadingOut`
//! ramps down and then pauses, stops, or keeps playing at the reached
//! factor, depending on what started the fade.
//!
//! Entering `Playing` from `Stopped` fills and queues the whole ring (or
//! queues the resident buffer from its start) before the voice is told to
//! play. Entering `Stopped` stops the voice, unqueues every chunk and resets
//! the position to the start.

use crate::audio::types::{ChunkRef, PcmFormat, Sound};
use crate::playback::backend::{VoiceBackend, VoiceHandle};
use crate::playback::buffer_ring::{BufferRing, RingUpdate};
use crate::playback::fader::{effective_gain, Fade, FadeEnd};
use rill_common::FadeCurve;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Lifecycle state of a Player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Stopped,
    Playing,
    Paused,
    FadingIn,
    FadingOut,
}

/// Copies of a resident buffer kept queued while looping, so the next pass
/// is already queued when the current one finishes
const RESIDENT_LOOP_DEPTH: usize = 2;

/// PCM storage a Player reads from
pub enum PlayerBuffer {
    /// Whole sound decoded once, shared by every Player of the Sound
    Resident(ChunkRef),

    /// Ring of chunks streamed from this Player's own decoder
    Stream(BufferRing),
}

impl PlayerBuffer {
    pub fn is_streamed(&self) -> bool {
        matches!(self, PlayerBuffer::Stream(_))
    }

    /// Format of the PCM handed to the voice
    pub fn format(&self) -> PcmFormat {
        match self {
            PlayerBuffer::Resident(chunk) => chunk.format(),
            PlayerBuffer::Stream(ring) => ring.format(),
        }
    }
}

/// One playback instance
pub struct Player {
    sound: Arc<Sound>,
    voice: VoiceHandle,
    buffer: PlayerBuffer,
    state: PlayerState,
    looping: bool,
    base_gain: f32,
    /// master × category from the last tick
    context_gain: f32,
    fade: Option<Fade>,
    fade_factor: f32,
    /// Factor the Player plays at outside fades; set by `fade_to`, reset on stop
    level: f32,
    curve: FadeCurve,
    /// Bytes played since the last start from stopped
    position: usize,
    /// Gain last pushed to the voice
    current_gain: f32,
}

impl Player {
    /// Create a stopped Player on an allocated voice
    pub fn new(sound: Arc<Sound>, voice: VoiceHandle, buffer: PlayerBuffer, curve: FadeCurve) -> Self {
        Self {
            sound,
            voice,
            buffer,
            state: PlayerState::Stopped,
            looping: false,
            base_gain: 1.0,
            context_gain: 1.0,
            fade: None,
            fade_factor: 1.0,
            level: 1.0,
            curve,
            position: 0,
            current_gain: 1.0,
        }
    }

    pub fn sound(&self) -> &Arc<Sound> {
        &self.sound
    }

    pub fn voice(&self) -> VoiceHandle {
        self.voice
    }

    pub fn buffer(&self) -> &PlayerBuffer {
        &self.buffer
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// True while audible or about to be: playing or fading either way
    pub fn is_playing(&self) -> bool {
        matches!(
            self.state,
            PlayerState::Playing | PlayerState::FadingIn | PlayerState::FadingOut
        )
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlayerState::Paused
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn gain(&self) -> f32 {
        self.base_gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.base_gain = gain.clamp(0.0, 1.0);
    }

    /// Set master × category gain ahead of the next tick
    pub fn set_context_gain(&mut self, gain: f32) {
        self.context_gain = gain;
    }

    /// Gain last applied to the voice
    pub fn current_gain(&self) -> f32 {
        self.current_gain
    }

    pub fn fade_factor(&self) -> f32 {
        self.fade_factor
    }

    /// Byte position within the current buffer or stream
    pub fn position_bytes(&self) -> usize {
        self.position
    }

    /// Seconds played since the last start
    pub fn time_position(&self) -> f32 {
        self.buffer.format().bytes_to_seconds(self.position)
    }

    /// Start or resume playback, fading in over `fade_time` seconds
    pub fn play<B: VoiceBackend + ?Sized>(&mut self, fade_time: f32, backend: &mut B) {
        match self.state {
            PlayerState::Playing | PlayerState::FadingIn => {}
            PlayerState::FadingOut => {
                let lowering = self.fade.map(|f| f.on_complete()) == Some(FadeEnd::Continue);
                if !lowering {
                    // Turn the ramp around from wherever it got to
                    self.begin_fade(self.level, fade_time, FadeEnd::Continue);
                    self.apply_gain(backend);
                }
            }
            PlayerState::Paused => {
                self.fade_factor = if fade_time > 0.0 { 0.0 } else { self.level };
                self.begin_fade(self.level, fade_time, FadeEnd::Continue);
                self.apply_gain(backend);
                backend.play(self.voice);
                debug!("Resumed '{}'", self.sound.name());
            }
            PlayerState::Stopped => {
                self.level = 1.0;
                self.fade_factor = if fade_time > 0.0 { 0.0 } else { 1.0 };
                self.start_voice(backend);
                self.begin_fade(1.0, fade_time, FadeEnd::Continue);
                self.apply_gain(backend);
                backend.play(self.voice);
                debug!("Started '{}' (looping={})", self.sound.name(), self.looping);
            }
        }
    }

    /// Pause, fading out over `fade_time` seconds first
    pub fn pause<B: VoiceBackend + ?Sized>(&mut self, fade_time: f32, backend: &mut B) {
        if !self.is_playing() {
            return;
        }
        if fade_time > 0.0 {
            self.begin_fade(0.0, fade_time, FadeEnd::Pause);
        } else {
            self.pause_now(backend);
        }
    }

    /// Stop, fading out over `fade_time` seconds first
    pub fn stop<B: VoiceBackend + ?Sized>(&mut self, fade_time: f32, backend: &mut B) {
        match self.state {
            PlayerState::Stopped => {}
            PlayerState::Paused => self.stop_now(backend),
            _ if fade_time > 0.0 => self.begin_fade(0.0, fade_time, FadeEnd::Stop),
            _ => self.stop_now(backend),
        }
    }

    /// Ramp the fade factor to `target` over `duration` seconds and keep
    /// playing at it, including after a pause and resume
    pub fn fade_to(&mut self, target: f32, duration: f32) {
        if !self.is_playing() {
            trace!("Ignoring fade on '{}' while {:?}", self.sound.name(), self.state);
            return;
        }
        self.level = target.clamp(0.0, 1.0);
        self.begin_fade(self.level, duration, FadeEnd::Continue);
    }

    /// Advance fades, keep the voice fed and push the effective gain
    ///
    /// `context_gain` is master × category gain.
    pub fn update<B: VoiceBackend + ?Sized>(&mut self, dt: f32, context_gain: f32, backend: &mut B) {
        self.context_gain = context_gain;

        if self.is_playing() {
            self.advance_fade(dt, backend);
        }
        if self.is_playing() {
            self.update_buffer(backend);
        }

        self.apply_gain(backend);
    }

    /// Stop and return the voice to the backend pool
    pub fn release<B: VoiceBackend + ?Sized>(mut self, backend: &mut B) {
        self.stop_now(backend);
        backend.release_voice(self.voice);
        debug!("Released voice {} of '{}'", self.voice.id(), self.sound.name());
    }

    fn begin_fade(&mut self, target: f32, duration: f32, on_complete: FadeEnd) {
        if duration <= 0.0 {
            self.fade = None;
            self.fade_factor = target.clamp(0.0, 1.0);
            // Immediate pause and stop never get here
            self.state = PlayerState::Playing;
            return;
        }

        let fade = Fade::new(self.fade_factor, target, duration, self.curve, on_complete);
        self.state = if fade.is_rising() {
            PlayerState::FadingIn
        } else {
            PlayerState::FadingOut
        };
        self.fade = Some(fade);
    }

    fn advance_fade<B: VoiceBackend + ?Sized>(&mut self, dt: f32, backend: &mut B) {
        let Some(fade) = self.fade.as_mut() else {
            return;
        };
        fade.advance(dt);
        self.fade_factor = fade.factor();
        if !fade.is_complete() {
            return;
        }

        let end = fade.on_complete();
        self.fade = None;
        trace!("Fade on '{}' complete ({:?})", self.sound.name(), end);
        match end {
            FadeEnd::Continue => self.state = PlayerState::Playing,
            FadeEnd::Pause => self.pause_now(backend),
            FadeEnd::Stop => self.stop_now(backend),
        }
    }

    /// Queue the start of the sound on the voice
    fn start_voice<B: VoiceBackend + ?Sized>(&mut self, backend: &mut B) {
        self.position = 0;
        match &mut self.buffer {
            PlayerBuffer::Stream(ring) => {
                ring.fill_start_buffers(self.looping);
                ring.queue_all(backend, self.voice);
            }
            PlayerBuffer::Resident(chunk) => {
                let depth = if self.looping { RESIDENT_LOOP_DEPTH } else { 1 };
                let copies = vec![Arc::clone(chunk); depth];
                backend.queue_chunks(self.voice, &copies);
            }
        }
    }

    fn update_buffer<B: VoiceBackend + ?Sized>(&mut self, backend: &mut B) {
        let voice = self.voice;
        let looping = self.looping;

        match &mut self.buffer {
            PlayerBuffer::Stream(ring) => {
                let outcome = ring.update(backend, voice, looping);
                self.position = ring.played_bytes() + backend.byte_offset(voice);
                match outcome {
                    RingUpdate::Exhausted => {
                        debug!("Stream '{}' finished", self.sound.name());
                        self.stop_now(backend);
                    }
                    RingUpdate::Recovered | RingUpdate::Resynced(_) => {
                        trace!("'{}' recovered: {:?}", self.sound.name(), outcome);
                    }
                    RingUpdate::Idle | RingUpdate::Refilled(_) => {}
                }
            }
            PlayerBuffer::Resident(chunk) => {
                let chunk = Arc::clone(chunk);
                self.update_resident(&chunk, backend);
            }
        }
    }

    fn update_resident<B: VoiceBackend + ?Sized>(&mut self, chunk: &ChunkRef, backend: &mut B) {
        let voice = self.voice;
        let queued = backend.queued_count(voice);

        if queued == 0 {
            // The backend reclaimed everything: requeue and continue from the
            // last known position
            warn!("Underrun on '{}', resuming at byte {}", self.sound.name(), self.position);
            backend.stop(voice);
            let depth = if self.looping { RESIDENT_LOOP_DEPTH } else { 1 };
            backend.queue_chunks(voice, &vec![Arc::clone(chunk); depth]);
            backend.play(voice);
            backend.set_byte_offset(voice, self.position);
            return;
        }

        let processed = backend.processed_count(voice).min(queued);
        if processed == 0 {
            self.position = backend.byte_offset(voice);
            return;
        }

        let copies = vec![Arc::clone(chunk); processed];
        backend.unqueue_chunks(voice, &copies);

        if self.looping {
            backend.queue_chunks(voice, &copies);
            if processed == queued {
                // Drained between ticks; the voice stopped itself
                backend.play(voice);
            }
            self.position = backend.byte_offset(voice);
        } else if processed == queued {
            debug!("'{}' finished", self.sound.name());
            self.stop_now(backend);
        }
    }

    fn pause_now<B: VoiceBackend + ?Sized>(&mut self, backend: &mut B) {
        backend.pause(self.voice);
        self.fade = None;
        self.state = PlayerState::Paused;
        debug!("Paused '{}'", self.sound.name());
    }

    fn stop_now<B: VoiceBackend + ?Sized>(&mut self, backend: &mut B) {
        backend.stop(self.voice);
        match &self.buffer {
            PlayerBuffer::Stream(ring) => ring.unqueue_all(backend, self.voice),
            PlayerBuffer::Resident(chunk) => {
                let queued = backend.queued_count(self.voice);
                backend.unqueue_chunks(self.voice, &vec![Arc::clone(chunk); queued]);
            }
        }
        self.fade = None;
        self.fade_factor = 1.0;
        self.level = 1.0;
        self.position = 0;
        if self.state != PlayerState::Stopped {
            debug!("Stopped '{}'", self.sound.name());
        }
        self.state = PlayerState::Stopped;
    }

    fn apply_gain<B: VoiceBackend + ?Sized>(&mut self, backend: &mut B) {
        self.current_gain = effective_gain(self.context_gain, 1.0, self.base_gain, self.fade_factor);
        backend.set_gain(self.voice, self.current_gain);
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("sound", &self.sound.name())
            .field("voice", &self.voice)
            .field("state", &self.state)
            .field("looping", &self.looping)
            .field("base_gain", &self.base_gain)
            .field("fade_factor", &self.fade_factor)
            .field("level", &self.level)
            .field("position", &self.position)
            .finish()
    }
}
