//! Playback manager tests
//!
//! Voice allocation, managed-player reaping, the software-mix callback path
//! and the polling update thread.

mod helpers;

use helpers::{constant_pcm, ramp_pcm};
use ringbuf::traits::{Observer, Split};
use ringbuf::HeapRb;
use rill_ap::audio::{PcmFormat, Sound};
use rill_ap::playback::{QueueBackend, SoftwareMixer, UpdateThread, VoiceBackend};
use rill_ap::{PlaybackManager, PlayerState};
use rill_common::{EngineConfig, UpdateMode};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn config(mode: UpdateMode) -> EngineConfig {
    EngineConfig {
        mode,
        stream_buffer_size: 4096,
        ..EngineConfig::default()
    }
}

fn long_sound(streamed: bool) -> Arc<Sound> {
    Arc::new(Sound::from_pcm(
        "long",
        "sfx",
        streamed,
        PcmFormat::new(2, 44100),
        ramp_pcm(200_000),
    ))
}

fn short_tone(frames: usize) -> Arc<Sound> {
    Arc::new(Sound::from_pcm(
        "blip",
        "sfx",
        false,
        PcmFormat::new(2, 44100),
        constant_pcm(frames, 2, 8192),
    ))
}

#[test]
fn test_second_managed_player_ignored_when_pool_exhausted() {
    let manager = PlaybackManager::new(QueueBackend::new(1), &config(UpdateMode::Polling));
    let sound = long_sound(true);

    let first = manager.create_managed_player(&sound, 0.0).unwrap();
    let voice = manager.voice(first).unwrap();
    let queued_before = manager.with_backend(|b| b.queued_count(voice));

    assert!(manager.create_managed_player(&sound, 0.0).is_none());

    assert_eq!(manager.player_count(), 1);
    assert_eq!(manager.state(first), Some(PlayerState::Playing));
    assert_eq!(manager.with_backend(|b| b.queued_count(voice)), queued_before);
    assert!(manager.with_backend(|b| b.is_playing(voice)));
}

#[test]
fn test_managed_player_reaped_after_finishing() {
    let manager = PlaybackManager::new(QueueBackend::new(2), &config(UpdateMode::Polling));
    let id = manager.create_managed_player(&short_tone(64), 0.0).unwrap();
    let voice = manager.voice(id).unwrap();

    manager.tick(0.01);
    assert_eq!(manager.player_count(), 1);

    manager.with_backend(|b| b.consume_chunks(voice, 1));
    manager.tick(0.01);

    assert_eq!(manager.player_count(), 0);
    assert_eq!(manager.state(id), None);
    assert_eq!(manager.with_backend(|b| b.voices_in_use()), 0);
}

#[test]
fn test_user_players_are_never_reaped() {
    let manager = PlaybackManager::new(QueueBackend::new(2), &config(UpdateMode::Polling));
    let id = manager.create_player(&short_tone(64)).unwrap();
    manager.play(id, 0.0).unwrap();
    let voice = manager.voice(id).unwrap();

    manager.with_backend(|b| b.consume_chunks(voice, 1));
    manager.tick(0.01);

    assert_eq!(manager.state(id), Some(PlayerState::Stopped));
    assert_eq!(manager.player_count(), 1);
}

#[test]
fn test_managed_player_survives_fade_but_not_pause() {
    let manager = PlaybackManager::new(QueueBackend::new(1), &config(UpdateMode::Polling));
    let sound = long_sound(true);
    let id = manager.create_managed_player(&sound, 0.5).unwrap();

    manager.tick(0.1);
    assert_eq!(manager.state(id), Some(PlayerState::FadingIn));

    manager.pause(id, 0.2).unwrap();
    manager.tick(0.1);
    assert_eq!(manager.state(id), Some(PlayerState::FadingOut));
    assert_eq!(manager.player_count(), 1);

    // Paused is neither playing nor fading
    manager.tick(0.2);
    assert_eq!(manager.state(id), None);
    assert_eq!(manager.with_backend(|b| b.voices_in_use()), 0);

    // The single voice is free again
    let next = manager.create_managed_player(&sound, 0.0).unwrap();
    manager.pause(next, 0.0).unwrap();
    manager.tick(0.01);
    assert_eq!(manager.player_count(), 0);
}

#[test]
fn test_destroy_during_fade_releases_voice_immediately() {
    let manager = PlaybackManager::new(QueueBackend::new(1), &config(UpdateMode::Polling));
    let id = manager.create_player(&long_sound(true)).unwrap();
    manager.play(id, 0.0).unwrap();
    manager.stop(id, 1.0).unwrap();

    manager.destroy_player(id).unwrap();
    assert_eq!(manager.with_backend(|b| b.voices_in_use()), 0);
    assert!(manager.destroy_player(id).is_err());
}

#[test]
fn test_mix_audio_ticks_in_driver_callback_mode() {
    let mixer = SoftwareMixer::new(4, 2, 44100);
    let manager = PlaybackManager::new(mixer, &config(UpdateMode::DriverCallback));
    manager.create_managed_player(&short_tone(256), 0.0).unwrap();

    let mut out = vec![0.0f32; 1024];
    manager.mix_audio(&mut out);
    assert!((out[0] - 0.25).abs() < 1e-4);
    assert_eq!(out[1023], 0.0);

    // The drained Player is stopped on the next quantum and reaped
    manager.mix_audio(&mut out);
    assert!(out.iter().all(|s| *s == 0.0));
    assert_eq!(manager.player_count(), 0);
    assert_eq!(manager.with_backend(|m| m.voices_in_use()), 0);
}

#[test]
fn test_mix_audio_does_not_tick_in_polling_mode() {
    let mixer = SoftwareMixer::new(4, 2, 44100);
    let manager = PlaybackManager::new(mixer, &config(UpdateMode::Polling));
    let id = manager.create_managed_player(&long_sound(true), 1.0).unwrap();

    let mut out = vec![0.0f32; 1024];
    for _ in 0..10 {
        manager.mix_audio(&mut out);
    }

    // Fade never advanced, so the voice is still at zero gain
    assert_eq!(manager.state(id), Some(PlayerState::FadingIn));
    assert!(out.iter().all(|s| *s == 0.0));

    manager.tick(1.0);
    manager.mix_audio(&mut out);
    assert!(out.iter().any(|s| *s != 0.0));
}

#[test]
fn test_premixed_quanta_refill_between_mixes() {
    // Each 2048-frame quantum drains two of the three 1024-frame chunks
    let premix = EngineConfig {
        buffer_frames: 2048,
        ..config(UpdateMode::Polling)
    };
    assert!(premix.validate().is_ok());

    let manager = PlaybackManager::new(SoftwareMixer::new(2, 2, 44100), &premix);
    let sound = Arc::new(Sound::from_pcm(
        "steady",
        "music",
        true,
        PcmFormat::new(2, 44100),
        constant_pcm(44100, 2, 16384),
    ));
    manager.create_managed_player(&sound, 0.0).unwrap();
    manager.tick(0.01);

    // Four quanta back to back, as the update thread renders them
    let mut out = vec![0.0f32; 2048 * 2];
    for quantum in 0..4 {
        let dt = if quantum == 0 { 0.01 } else { 0.0 };
        manager.tick_and_mix(dt, &mut out);
        let silent = out.iter().filter(|s| (**s - 0.5).abs() > 1e-4).count();
        assert_eq!(silent, 0, "quantum {} had {} wrong samples", quantum, silent);
    }
}

#[test]
fn test_streamed_player_plays_gaplessly_through_mixer() {
    let mixer = SoftwareMixer::new(1, 2, 44100);
    let manager = PlaybackManager::new(mixer, &config(UpdateMode::DriverCallback));
    let sound = Arc::new(Sound::from_pcm(
        "steady",
        "music",
        true,
        PcmFormat::new(2, 44100),
        constant_pcm(44100, 2, 16384),
    ));
    let id = manager.create_player(&sound).unwrap();
    manager.set_loop(id, true).unwrap();
    manager.play(id, 0.0).unwrap();

    // 256-frame quanta: far shorter than a chunk, so refills always land in time
    let mut out = vec![0.0f32; 512];
    for _ in 0..400 {
        manager.mix_audio(&mut out);
        assert!(out.iter().all(|s| (*s - 0.5).abs() < 1e-4));
    }
    assert_eq!(manager.state(id), Some(PlayerState::Playing));
}

#[test]
fn test_half_rate_stream_is_interpolated_to_mixer_rate() {
    let mixer = SoftwareMixer::new(1, 1, 44100);
    let manager = PlaybackManager::new(mixer, &config(UpdateMode::DriverCallback));
    let ramp: Vec<u8> = (0..4000i16).flat_map(|i| (i * 5).to_le_bytes()).collect();
    let sound = Arc::new(Sound::from_pcm("ramp", "sfx", true, PcmFormat::new(1, 22050), ramp));
    manager.create_managed_player(&sound, 0.0).unwrap();

    let mut mixed = Vec::new();
    let mut out = vec![0.0f32; 256];
    for _ in 0..32 {
        manager.mix_audio(&mut out);
        mixed.extend_from_slice(&out);
    }

    // 4000 input frames span 8000 output frames, none repeating its neighbour
    assert!(mixed[7990] > 0.5);
    for (i, pair) in mixed[100..7900].windows(2).enumerate() {
        assert!(pair[1] > pair[0], "frame {} not rising: {:?}", i + 100, pair);
    }
}

#[test]
fn test_disabled_manager_mixes_silence() {
    let manager = PlaybackManager::disabled(SoftwareMixer::new(2, 2, 44100), &config(UpdateMode::DriverCallback));
    assert!(manager.create_managed_player(&short_tone(64), 0.0).is_none());

    let mut out = vec![1.0f32; 64];
    manager.mix_audio(&mut out);
    assert!(out.iter().all(|s| *s == 0.0));
}

#[test]
fn test_players_created_from_many_threads() {
    let manager = PlaybackManager::new(QueueBackend::new(16), &config(UpdateMode::Polling));
    let sound = long_sound(false);

    let mut update = UpdateThread::spawn(manager.clone(), Duration::from_millis(1)).unwrap();
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            let sound = Arc::clone(&sound);
            thread::spawn(move || {
                for _ in 0..4 {
                    let id = manager.create_player(&sound).unwrap();
                    manager.play(id, 0.0).unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    update.shutdown();

    assert_eq!(manager.player_count(), 16);
    assert_eq!(manager.playing_count(), 16);
    assert!(manager.create_player(&sound).is_none());
}

#[test]
fn test_update_thread_advances_fades() {
    let manager = PlaybackManager::new(QueueBackend::new(2), &config(UpdateMode::Polling));
    let id = manager.create_player(&long_sound(true)).unwrap();
    manager.play(id, 0.05).unwrap();

    let mut update = UpdateThread::spawn(manager.clone(), Duration::from_millis(5)).unwrap();
    assert!(update.is_running());
    thread::sleep(Duration::from_millis(300));
    update.shutdown();

    assert!(!update.is_running());
    assert_eq!(manager.state(id), Some(PlayerState::Playing));
}

#[test]
fn test_update_thread_fills_output_ring() {
    let mixer = SoftwareMixer::new(2, 2, 44100);
    let manager = PlaybackManager::new(mixer, &config(UpdateMode::Polling));
    manager.create_managed_player(&long_sound(true), 0.0).unwrap();

    let ring = HeapRb::<f32>::new(4096);
    let (producer, consumer) = ring.split();
    let update = UpdateThread::spawn_with_output(manager.clone(), producer, Duration::from_millis(5), 1024).unwrap();

    thread::sleep(Duration::from_millis(100));
    drop(update);

    assert_eq!(consumer.occupied_len(), 4096);
}
