use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use crossbeam::channel::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::clock::{AudioClock, FrameClock};
use super::queue::{VoiceCommand, VoiceSender, voice_queue};
use super::renderer::ClickRenderer;
use super::sound::{ClickBank, SoundSource, TriggerHandle};
use super::{AudioConfig, AudioEvent};
use crate::metronome::BeatKind;

/// Largest block the callback renders at once; bigger device buffers are split.
const MAX_BLOCK_FRAMES: usize = 4096;

/// Sound source that hands triggers to the output stream's callback.
pub struct CpalSoundSource {
    sender: Mutex<VoiceSender>,
    clock: FrameClock,
    next_id: AtomicU64,
}

impl CpalSoundSource {
    pub fn new(sender: VoiceSender, clock: FrameClock) -> Self {
        Self {
            sender: Mutex::new(sender),
            clock,
            next_id: AtomicU64::new(0),
        }
    }

    fn send(&self, command: VoiceCommand) -> bool {
        match self.sender.lock() {
            Ok(mut sender) => sender.send(command),
            Err(_) => false,
        }
    }
}

impl SoundSource for CpalSoundSource {
    fn trigger(&self, kind: BeatKind, at: f64) -> TriggerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let start_frame = self.clock.seconds_to_frame(at);
        if !self.send(VoiceCommand::Trigger {
            id,
            kind,
            start_frame,
        }) {
            log::warn!("Voice queue full, dropped {} click at {:.3}s", kind.label(), at);
        }
        TriggerHandle(id)
    }

    fn cancel(&self, handle: TriggerHandle) {
        if !self.send(VoiceCommand::Cancel { id: handle.0 }) {
            log::warn!("Voice queue full, could not cancel trigger {}", handle.0);
        }
    }
}

/// Output device plus the clock and sound source bound to it.
pub struct AudioStream {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    device_name: String,
    clock: FrameClock,
}

impl AudioStream {
    /// Open the named output device, or the host default when `device_name` is None.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            let mut found = None;
            for device in host.output_devices()? {
                if let Ok(candidate) = device.name()
                    && candidate == name
                {
                    found = Some(device);
                    break;
                }
            }
            found.ok_or_else(|| anyhow!("Output device '{}' not found", name))?
        } else {
            host.default_output_device()
                .ok_or_else(|| anyhow!("No output device available"))?
        };

        let default_config = device.default_output_config()?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        log::info!(
            "Output device: {} ({}Hz, {}ch, {:?})",
            device_name,
            config.sample_rate.0,
            config.channels,
            default_config.sample_format()
        );

        Ok(Self {
            device,
            sample_format: default_config.sample_format(),
            clock: FrameClock::new(config.sample_rate.0),
            config,
            device_name,
        })
    }

    pub fn clock(&self) -> FrameClock {
        self.clock.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Build and start the output stream. The returned stream must be kept alive.
    pub fn start(
        &self,
        bank: Arc<ClickBank>,
        audio_config: &AudioConfig,
        event_sender: Sender<AudioEvent>,
    ) -> Result<(Stream, Arc<CpalSoundSource>)> {
        if self.sample_format != SampleFormat::F32 {
            log::warn!(
                "Device prefers {:?}; requesting f32 output anyway",
                self.sample_format
            );
        }

        let (sender, receiver) = voice_queue(audio_config.voice_queue_capacity);
        let source = Arc::new(CpalSoundSource::new(sender, self.clock.clone()));
        let mut renderer = ClickRenderer::new(bank, receiver, audio_config.volume);

        let clock = self.clock.clone();
        let channels = self.config.channels as usize;
        let mut mono = vec![0.0f32; MAX_BLOCK_FRAMES];
        let overflow_sender = event_sender.clone();

        let stream = self.device.build_output_stream(
            &self.config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if !clock.is_running() {
                    data.fill(0.0);
                    return;
                }

                for frame_chunk in data.chunks_mut(MAX_BLOCK_FRAMES * channels) {
                    let frames = frame_chunk.len() / channels;
                    let block = &mut mono[..frames];
                    renderer.render(block, clock.frames());

                    for (frame, &sample) in frame_chunk.chunks_mut(channels).zip(block.iter()) {
                        frame.fill(sample);
                    }
                    clock.advance(frames as u64);
                }

                let dropped = renderer.take_dropped();
                if dropped > 0 {
                    let _ = overflow_sender.try_send(AudioEvent::VoicesDropped(dropped));
                }
            },
            move |_err| {
                let _ = event_sender.try_send(AudioEvent::Error(String::from(
                    "Output stream error",
                )));
            },
            None,
        )?;

        stream.play()?;
        log::info!(
            "Audio stream started: {}Hz, {}ch on {}",
            self.config.sample_rate.0,
            self.config.channels,
            self.device_name
        );

        Ok((stream, source))
    }
}

/// Names of every output device on the default host.
pub fn enumerate_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let mut outputs = Vec::new();
    for device in host.output_devices()? {
        outputs.push(device.name().unwrap_or_else(|_| "Unknown".to_string()));
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_converts_time_to_frames() {
        let clock = FrameClock::new(48000);
        let (tx, mut rx) = voice_queue(8);
        let source = CpalSoundSource::new(tx, clock.clone());

        let a = source.trigger(BeatKind::Accented, 0.5);
        let b = source.trigger(BeatKind::Normal, 1.0);
        source.cancel(a);

        assert_ne!(a, b);
        assert_eq!(
            rx.try_recv(),
            Some(VoiceCommand::Trigger {
                id: a.0,
                kind: BeatKind::Accented,
                start_frame: 24000
            })
        );
        assert_eq!(
            rx.try_recv(),
            Some(VoiceCommand::Trigger {
                id: b.0,
                kind: BeatKind::Normal,
                start_frame: 48000
            })
        );
        assert_eq!(rx.try_recv(), Some(VoiceCommand::Cancel { id: a.0 }));
        assert_eq!(clock.now(), 0.0);
    }

    #[test]
    fn test_full_queue_still_returns_handle() {
        let (tx, _rx) = voice_queue(1);
        let source = CpalSoundSource::new(tx, FrameClock::new(48000));
        let first = source.trigger(BeatKind::Normal, 0.0);
        let second = source.trigger(BeatKind::Normal, 0.5);
        assert_ne!(first, second);
        source.cancel(second);
    }
}
