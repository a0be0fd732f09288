//! Playback: buffer ring, player state machine, voice backends and manager

pub mod backend;
pub mod buffer_ring;
pub mod fader;
pub mod manager;
pub mod player;
pub mod ring_index;
pub mod update_thread;

pub use backend::{QueueBackend, SoftwareMixer, VoiceBackend, VoiceHandle, VoiceState};
pub use buffer_ring::{BufferRing, RingUpdate};
pub use fader::{effective_gain, Fade, FadeEnd};
pub use manager::{PlaybackManager, PlayerId};
pub use player::{Player, PlayerBuffer, PlayerState};
pub use ring_index::RingIndex;
pub use update_thread::UpdateThread;
