// Renders scheduled click voices into output blocks on the audio thread

use std::sync::Arc;

use super::mixer::VoiceMixer;
use super::queue::{VoiceCommand, VoiceReceiver, voice_queue};
use super::sound::{ClickBank, RecordedTrigger};
use crate::metronome::BeatKind;

const MAX_VOICES: usize = 64;

#[derive(Debug, Clone, Copy)]
struct Voice {
    id: u64,
    kind: BeatKind,
    start_frame: u64,
}

/// Owns the consumer side of the voice queue. Preallocates on construction so
/// `render` never allocates.
pub struct ClickRenderer {
    bank: Arc<ClickBank>,
    receiver: VoiceReceiver,
    voices: Vec<Voice>,
    mixer: VoiceMixer,
    volume: f32,
}

impl ClickRenderer {
    pub fn new(bank: Arc<ClickBank>, receiver: VoiceReceiver, volume: f32) -> Self {
        Self {
            bank,
            receiver,
            voices: Vec::with_capacity(MAX_VOICES),
            mixer: VoiceMixer::new(),
            volume: volume.clamp(0.0, 1.0),
        }
    }

    #[cfg(test)]
    fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn take_dropped(&self) -> u64 {
        self.receiver.take_dropped()
    }

    /// Fill `output` with the mono mix for frames `[block_start, block_start + len)`.
    /// Voices whose start frame has already passed begin at offset 0.
    pub fn render(&mut self, output: &mut [f32], block_start: u64) {
        self.drain_commands(block_start);
        self.mixer.clear(output);

        let block_end = block_start + output.len() as u64;
        for voice in &self.voices {
            if voice.start_frame >= block_end {
                continue;
            }
            let sample = self.bank.sample(voice.kind);
            let (dest_offset, src_offset) = if voice.start_frame >= block_start {
                ((voice.start_frame - block_start) as usize, 0)
            } else {
                (0, (block_start - voice.start_frame) as usize)
            };
            if src_offset >= sample.len() {
                continue;
            }
            self.mixer
                .add(&mut output[dest_offset..], &sample[src_offset..], self.volume);
        }

        let bank = &self.bank;
        self.voices.retain(|voice| {
            let end = voice.start_frame + bank.sample(voice.kind).len() as u64;
            end > block_end
        });

        self.mixer.limit(output);
    }

    fn drain_commands(&mut self, block_start: u64) {
        while let Some(command) = self.receiver.try_recv() {
            match command {
                VoiceCommand::Trigger {
                    id,
                    kind,
                    start_frame,
                } => {
                    if kind.is_audible() && self.voices.len() < MAX_VOICES {
                        self.voices.push(Voice {
                            id,
                            kind,
                            start_frame,
                        });
                    }
                }
                VoiceCommand::Cancel { id } => {
                    // Only silence voices that have not started sounding.
                    self.voices
                        .retain(|v| v.id != id || v.start_frame < block_start);
                }
            }
        }
    }
}

/// Render a recorded trigger schedule to a mono buffer, outside any device.
/// Cancelled triggers should be filtered out by the caller.
pub fn render_offline(
    bank: Arc<ClickBank>,
    triggers: &[RecordedTrigger],
    sample_rate: u32,
    seconds: f64,
    volume: f32,
) -> Vec<f32> {
    const BLOCK: usize = 512;

    let total = (seconds.max(0.0) * sample_rate as f64).round() as usize;
    let (mut sender, receiver) = voice_queue(MAX_VOICES);
    let mut renderer = ClickRenderer::new(bank, receiver, volume);
    let mut output = vec![0.0f32; total];

    let mut pending = triggers.iter().peekable();
    for (block, chunk) in output.chunks_mut(BLOCK).enumerate() {
        let block_start = (block * BLOCK) as u64;
        let block_end = block_start + chunk.len() as u64;
        while let Some(trigger) =
            pending.next_if(|t| ((t.at * sample_rate as f64).round() as u64) < block_end)
        {
            sender.send(VoiceCommand::Trigger {
                id: trigger.handle.0,
                kind: trigger.kind,
                start_frame: (trigger.at.max(0.0) * sample_rate as f64).round() as u64,
            });
        }
        renderer.render(chunk, block_start);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sound::TriggerHandle;

    fn renderer() -> (crate::audio::queue::VoiceSender, ClickRenderer, Arc<ClickBank>) {
        let bank = Arc::new(ClickBank::synthesized(1000));
        let (tx, rx) = voice_queue(16);
        (tx, ClickRenderer::new(Arc::clone(&bank), rx, 1.0), bank)
    }

    #[test]
    fn test_voice_starts_at_frame_offset() {
        let (mut tx, mut renderer, bank) = renderer();
        tx.send(VoiceCommand::Trigger {
            id: 0,
            kind: BeatKind::Accented,
            start_frame: 10,
        });

        let mut out = vec![0.0; 32];
        renderer.render(&mut out, 0);

        assert!(out[..10].iter().all(|&s| s == 0.0));
        let click = bank.sample(BeatKind::Accented);
        for i in 10..32 {
            assert!((out[i] - click[i - 10]).abs() < 1e-6);
        }
        assert_eq!(renderer.active_voices(), 1);
    }

    #[test]
    fn test_voice_spans_blocks_and_finishes() {
        let (mut tx, mut renderer, bank) = renderer();
        let len = bank.sample(BeatKind::Normal).len();
        tx.send(VoiceCommand::Trigger {
            id: 0,
            kind: BeatKind::Normal,
            start_frame: 0,
        });

        let mut out = vec![0.0; 16];
        renderer.render(&mut out, 0);
        renderer.render(&mut out, 16);
        let click = bank.sample(BeatKind::Normal);
        assert!((out[0] - click[16]).abs() < 1e-6);

        let mut long = vec![0.0; len];
        renderer.render(&mut long, 32);
        assert_eq!(renderer.active_voices(), 0);
    }

    #[test]
    fn test_cancel_before_start_silences() {
        let (mut tx, mut renderer, _) = renderer();
        tx.send(VoiceCommand::Trigger {
            id: 7,
            kind: BeatKind::Accented,
            start_frame: 100,
        });
        tx.send(VoiceCommand::Cancel { id: 7 });

        let mut out = vec![0.0; 200];
        renderer.render(&mut out, 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_cancel_after_start_is_ignored() {
        let (mut tx, mut renderer, _) = renderer();
        tx.send(VoiceCommand::Trigger {
            id: 3,
            kind: BeatKind::Accented,
            start_frame: 0,
        });
        let mut out = vec![0.0; 8];
        renderer.render(&mut out, 0);

        tx.send(VoiceCommand::Cancel { id: 3 });
        renderer.render(&mut out, 8);
        assert_eq!(renderer.active_voices(), 1);
        assert!(out.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_late_voice_plays_from_block_start() {
        let (mut tx, mut renderer, bank) = renderer();
        tx.send(VoiceCommand::Trigger {
            id: 0,
            kind: BeatKind::Soft,
            start_frame: 95,
        });
        let mut out = vec![0.0; 10];
        renderer.render(&mut out, 100);
        let click = bank.sample(BeatKind::Soft);
        assert!((out[0] - click[5]).abs() < 1e-6);
    }

    #[test]
    fn test_render_offline_places_clicks() {
        let bank = Arc::new(ClickBank::synthesized(1000));
        let triggers = [
            RecordedTrigger {
                handle: TriggerHandle(0),
                kind: BeatKind::Accented,
                at: 0.0,
            },
            RecordedTrigger {
                handle: TriggerHandle(1),
                kind: BeatKind::Soft,
                at: 0.6,
            },
        ];

        let output = render_offline(Arc::clone(&bank), &triggers, 1000, 1.0, 1.0);
        assert_eq!(output.len(), 1000);

        let soft = bank.sample(BeatKind::Soft);
        assert_eq!(&output[600..600 + soft.len()], soft);
        let accent_len = bank.sample(BeatKind::Accented).len();
        assert!(output[accent_len..600].iter().all(|&s| s == 0.0));
    }
}
