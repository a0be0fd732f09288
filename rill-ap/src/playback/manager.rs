//! Playback Manager
//!
//! Owns every active Player and the voice backend behind one mutex. The tick
//! is the single serialization point: API calls from any thread take the same
//! lock, so a tick never observes a half-created or half-destroyed Player.
//!
//! # Tick
//!
//! ```text
//! lock → update every Player (fade, ring refill, gain) → [mix] → reap → unlock
//! ```
//!
//! In polling mode an owning thread calls [`PlaybackManager::tick`] at a fixed
//! interval. In driver-callback mode the output callback calls
//! [`PlaybackManager::mix_audio`], which ticks by the quantum it renders.
//!
//! Managed (fire-and-forget) Players are destroyed by the reap step once they
//! are neither playing nor fading, which includes a paused managed Player.
//!
//! When the backend names an output rate, streamed Sounds are decoded through
//! a resampler and resident Sounds use a buffer converted to that rate.

use crate::audio::resampler::resample_to;
use crate::audio::types::Sound;
use crate::error::{Error, Result};
use crate::playback::backend::{SoftwareMixer, VoiceBackend, VoiceHandle};
use crate::playback::buffer_ring::BufferRing;
use crate::playback::player::{Player, PlayerBuffer, PlayerState};
use rill_common::{EngineConfig, FadeCurve, UpdateMode};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Handle to a Player owned by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(u64);

impl PlayerId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

/// Registry entry
struct PlayerEntry {
    player: Player,
    /// Destroyed automatically once finished
    managed: bool,
}

/// Everything the mutex protects
struct ManagerState<B> {
    backend: B,
    players: BTreeMap<PlayerId, PlayerEntry>,
    next_id: u64,
    master_gain: f32,
    category_gains: HashMap<String, f32>,
}

impl<B: VoiceBackend> ManagerState<B> {
    fn context_gain(&self, category: &str) -> f32 {
        self.master_gain * self.category_gains.get(category).copied().unwrap_or(1.0)
    }

    /// Advance every Player by `dt` seconds
    fn update_players(&mut self, dt: f32) {
        let ManagerState {
            backend,
            players,
            master_gain,
            category_gains,
            ..
        } = self;

        for entry in players.values_mut() {
            let category = category_gains
                .get(entry.player.sound().category())
                .copied()
                .unwrap_or(1.0);
            entry.player.update(dt, *master_gain * category, backend);
        }
    }

    /// Destroy managed Players that have finished
    fn reap(&mut self) {
        let finished: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|(_, e)| e.managed && !e.player.is_playing() && !e.player.is_fading())
            .map(|(id, _)| *id)
            .collect();

        for id in finished {
            if let Some(entry) = self.players.remove(&id) {
                debug!("Reaping managed {} ('{}')", id, entry.player.sound().name());
                entry.player.release(&mut self.backend);
            }
        }
    }
}

/// Settings fixed at construction
#[derive(Debug, Clone)]
struct ManagerSettings {
    enabled: bool,
    buffer_count: usize,
    buffer_size: usize,
    curve: FadeCurve,
    /// Rate Sounds are converted to before their PCM reaches the backend
    output_rate: Option<u32>,
    /// `mix_audio` also ticks (driver-callback mode)
    tick_in_callback: bool,
}

/// Thread-safe registry of active Players over one voice backend
///
/// Clones share the same registry.
pub struct PlaybackManager<B: VoiceBackend> {
    state: Arc<Mutex<ManagerState<B>>>,
    settings: Arc<ManagerSettings>,
}

impl<B: VoiceBackend> Clone for PlaybackManager<B> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<B: VoiceBackend> PlaybackManager<B> {
    /// Create an enabled manager over `backend`
    pub fn new(backend: B, config: &EngineConfig) -> Self {
        Self::build(backend, config, true)
    }

    /// Create a manager whose every call is a no-op
    ///
    /// Used when the output device failed to initialize.
    pub fn disabled(backend: B, config: &EngineConfig) -> Self {
        warn!("Playback manager starting disabled, playback calls will be ignored");
        Self::build(backend, config, false)
    }

    fn build(backend: B, config: &EngineConfig, enabled: bool) -> Self {
        let settings = ManagerSettings {
            enabled,
            buffer_count: config.stream_buffer_count.max(1),
            buffer_size: config.stream_buffer_size,
            curve: config.fade_curve,
            output_rate: backend.output_rate(),
            tick_in_callback: config.mode == UpdateMode::DriverCallback,
        };
        info!(
            "Playback manager ready: {} x {} byte stream buffers, {:?} mode",
            settings.buffer_count, settings.buffer_size, config.mode
        );

        Self {
            state: Arc::new(Mutex::new(ManagerState {
                backend,
                players: BTreeMap::new(),
                next_id: 1,
                master_gain: 1.0,
                category_gains: HashMap::new(),
            })),
            settings: Arc::new(settings),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Create a stopped Player for `sound`
    ///
    /// Returns `None` when no voice is free, when the sound cannot be
    /// decoded, or when the manager is disabled. Existing playback is never
    /// affected.
    pub fn create_player(&self, sound: &Arc<Sound>) -> Option<PlayerId> {
        self.insert_player(sound, None)
    }

    /// Create a fire-and-forget Player that starts playing immediately
    ///
    /// # Arguments
    /// * `sound` - Sound to play once
    /// * `fade_in` - Fade-in duration in seconds (0 = start at full gain)
    pub fn create_managed_player(&self, sound: &Arc<Sound>, fade_in: f32) -> Option<PlayerId> {
        self.insert_player(sound, Some(fade_in))
    }

    fn insert_player(&self, sound: &Arc<Sound>, managed_fade_in: Option<f32>) -> Option<PlayerId> {
        if !self.settings.enabled {
            return None;
        }

        // Decoding happens outside the lock so a slow open never stalls a tick
        let buffer = match self.build_buffer(sound) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("Cannot create player for '{}': {}", sound.name(), e);
                return None;
            }
        };

        let mut state = self.lock();
        let Some(voice) = state.backend.allocate_voice() else {
            warn!("No free voice for '{}', play request ignored", sound.name());
            return None;
        };

        let id = PlayerId(state.next_id);
        state.next_id += 1;

        let mut player = Player::new(Arc::clone(sound), voice, buffer, self.settings.curve);
        let context = state.context_gain(sound.category());
        player.set_context_gain(context);

        if let Some(fade_in) = managed_fade_in {
            player.play(fade_in, &mut state.backend);
        }

        debug!(
            "Created {} for '{}' on voice {} (managed={})",
            id,
            sound.name(),
            voice.id(),
            managed_fade_in.is_some()
        );
        state.players.insert(
            id,
            PlayerEntry {
                player,
                managed: managed_fade_in.is_some(),
            },
        );
        Some(id)
    }

    fn build_buffer(&self, sound: &Sound) -> Result<PlayerBuffer> {
        if sound.is_streamed() {
            let decoder = resample_to(sound.open_decoder()?, self.settings.output_rate)?;
            Ok(PlayerBuffer::Stream(BufferRing::new(
                decoder,
                self.settings.buffer_count,
                self.settings.buffer_size,
                sound.name(),
            )))
        } else {
            Ok(PlayerBuffer::Resident(sound.resident_buffer_at(self.settings.output_rate)?))
        }
    }

    /// Stop a Player, unqueue its buffers and release its voice
    pub fn destroy_player(&self, id: PlayerId) -> Result<()> {
        if !self.settings.enabled {
            return Ok(());
        }
        let mut state = self.lock();
        let entry = state.players.remove(&id).ok_or(Error::PlayerNotFound(id.0))?;
        entry.player.release(&mut state.backend);
        debug!("Destroyed {}", id);
        Ok(())
    }

    /// Start or resume a Player, fading in over `fade_time` seconds
    pub fn play(&self, id: PlayerId, fade_time: f32) -> Result<()> {
        self.with_player(id, |player, backend| player.play(fade_time, backend))
    }

    pub fn pause(&self, id: PlayerId, fade_time: f32) -> Result<()> {
        self.with_player(id, |player, backend| player.pause(fade_time, backend))
    }

    pub fn stop(&self, id: PlayerId, fade_time: f32) -> Result<()> {
        self.with_player(id, |player, backend| player.stop(fade_time, backend))
    }

    pub fn set_loop(&self, id: PlayerId, looping: bool) -> Result<()> {
        self.with_player(id, |player, _| player.set_looping(looping))
    }

    /// Set a Player's base gain (clamped to [0, 1])
    pub fn set_gain(&self, id: PlayerId, gain: f32) -> Result<()> {
        self.with_player(id, |player, _| player.set_gain(gain))
    }

    /// Ramp a Player's fade factor to `target` over `duration` seconds
    pub fn fade_to(&self, id: PlayerId, target: f32, duration: f32) -> Result<()> {
        self.with_player(id, |player, _| player.fade_to(target, duration))
    }

    /// Current state, `None` for unknown ids or a disabled manager
    pub fn state(&self, id: PlayerId) -> Option<PlayerState> {
        self.lock().players.get(&id).map(|e| e.player.state())
    }

    /// Seconds played since the Player last started
    pub fn position(&self, id: PlayerId) -> Option<f32> {
        self.lock().players.get(&id).map(|e| e.player.time_position())
    }

    /// Gain last applied to the Player's voice
    pub fn current_gain(&self, id: PlayerId) -> Option<f32> {
        self.lock().players.get(&id).map(|e| e.player.current_gain())
    }

    /// Voice the Player plays on
    pub fn voice(&self, id: PlayerId) -> Option<VoiceHandle> {
        self.lock().players.get(&id).map(|e| e.player.voice())
    }

    /// Advance every Player by `dt` seconds, then reap finished managed Players
    pub fn tick(&self, dt: f32) {
        if !self.settings.enabled {
            return;
        }
        let mut state = self.lock();
        state.update_players(dt);
        state.reap();
    }

    pub fn master_gain(&self) -> f32 {
        self.lock().master_gain
    }

    pub fn set_master_gain(&self, gain: f32) {
        self.lock().master_gain = gain.clamp(0.0, 1.0);
    }

    /// Gain applied to every Player whose Sound has `category`
    pub fn set_category_gain(&self, category: &str, gain: f32) {
        self.lock()
            .category_gains
            .insert(category.to_string(), gain.clamp(0.0, 1.0));
    }

    /// Stop every Player, fading out over `fade_time` seconds
    pub fn stop_all(&self, fade_time: f32) {
        if !self.settings.enabled {
            return;
        }
        let mut state = self.lock();
        let ManagerState { backend, players, .. } = &mut *state;
        for entry in players.values_mut() {
            entry.player.stop(fade_time, backend);
        }
    }

    pub fn player_count(&self) -> usize {
        self.lock().players.len()
    }

    /// Number of Players currently playing or fading
    pub fn playing_count(&self) -> usize {
        self.lock()
            .players
            .values()
            .filter(|e| e.player.is_playing())
            .count()
    }

    /// Run `f` on the backend under the manager lock
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.lock().backend)
    }

    fn with_player(&self, id: PlayerId, f: impl FnOnce(&mut Player, &mut B)) -> Result<()> {
        if !self.settings.enabled {
            return Ok(());
        }
        let mut state = self.lock();
        let ManagerState {
            backend,
            players,
            master_gain,
            category_gains,
            ..
        } = &mut *state;

        let entry = players.get_mut(&id).ok_or(Error::PlayerNotFound(id.0))?;
        let category = category_gains
            .get(entry.player.sound().category())
            .copied()
            .unwrap_or(1.0);
        entry.player.set_context_gain(*master_gain * category);
        f(&mut entry.player, backend);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState<B>> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Playback manager lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl PlaybackManager<SoftwareMixer> {
    /// Render one output quantum into `out` (interleaved f32)
    ///
    /// In driver-callback mode this also ticks every Player by the quantum's
    /// duration. A disabled manager writes silence.
    pub fn mix_audio(&self, out: &mut [f32]) {
        if !self.settings.enabled {
            out.fill(0.0);
            return;
        }

        let mut state = self.lock();
        if self.settings.tick_in_callback {
            let frames = out.len() / state.backend.channels() as usize;
            let dt = frames as f32 / state.backend.sample_rate() as f32;
            state.update_players(dt);
        }
        state.backend.mix(out);
        state.reap();
    }

    /// Advance every Player by `dt`, then render one quantum into `out`
    ///
    /// Refill and mix happen under one lock, so every quantum starts from
    /// freshly refilled rings. The polling thread renders each pre-mixed
    /// quantum this way.
    pub fn tick_and_mix(&self, dt: f32, out: &mut [f32]) {
        if !self.settings.enabled {
            out.fill(0.0);
            return;
        }

        let mut state = self.lock();
        state.update_players(dt);
        state.backend.mix(out);
        state.reap();
    }

    /// Output channel count of the mixer
    pub fn channels(&self) -> u16 {
        self.lock().backend.channels()
    }
}

impl<B: VoiceBackend> fmt::Debug for PlaybackManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackManager")
            .field("enabled", &self.settings.enabled)
            .field("players", &self.player_count())
            .finish()
    }
}
