// Lock-free command queue from the scheduler thread to the audio callback

use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::metronome::BeatKind;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceCommand {
    Trigger {
        id: u64,
        kind: BeatKind,
        start_frame: u64,
    },
    Cancel {
        id: u64,
    },
}

/// Create a bounded single-producer/single-consumer voice queue.
pub fn voice_queue(capacity: usize) -> (VoiceSender, VoiceReceiver) {
    let (producer, consumer) = RingBuffer::new(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        VoiceSender {
            producer,
            dropped: Arc::clone(&dropped),
        },
        VoiceReceiver { consumer, dropped },
    )
}

pub struct VoiceSender {
    producer: Producer<VoiceCommand>,
    dropped: Arc<AtomicU64>,
}

impl VoiceSender {
    /// Non-blocking push. Returns false and counts a drop when the queue is full.
    pub fn send(&mut self, command: VoiceCommand) -> bool {
        match self.producer.push(command) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

pub struct VoiceReceiver {
    consumer: Consumer<VoiceCommand>,
    dropped: Arc<AtomicU64>,
}

impl VoiceReceiver {
    /// Non-blocking pop, audio thread safe.
    pub fn try_recv(&mut self) -> Option<VoiceCommand> {
        self.consumer.pop().ok()
    }

    #[cfg(test)]
    fn available(&self) -> usize {
        self.consumer.slots()
    }

    /// Number of commands lost to a full queue since the last call.
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_receive_in_order() {
        let (mut tx, mut rx) = voice_queue(8);
        assert!(tx.send(VoiceCommand::Trigger {
            id: 1,
            kind: BeatKind::Accented,
            start_frame: 100,
        }));
        assert!(tx.send(VoiceCommand::Cancel { id: 1 }));

        assert_eq!(rx.available(), 2);
        assert!(matches!(
            rx.try_recv(),
            Some(VoiceCommand::Trigger { id: 1, .. })
        ));
        assert_eq!(rx.try_recv(), Some(VoiceCommand::Cancel { id: 1 }));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn test_overflow_counts_drops() {
        let (mut tx, rx) = voice_queue(2);
        assert!(tx.send(VoiceCommand::Cancel { id: 1 }));
        assert!(tx.send(VoiceCommand::Cancel { id: 2 }));
        assert!(!tx.send(VoiceCommand::Cancel { id: 3 }));

        assert_eq!(rx.take_dropped(), 1);
        assert_eq!(rx.take_dropped(), 0);
    }

    #[test]
    fn test_cross_thread() {
        let (mut tx, mut rx) = voice_queue(256);
        let writer = std::thread::spawn(move || {
            for id in 0..100 {
                while !tx.send(VoiceCommand::Cancel { id }) {
                    std::thread::yield_now();
                }
            }
        });

        let mut received = Vec::new();
        while received.len() < 100 {
            if let Some(VoiceCommand::Cancel { id }) = rx.try_recv() {
                received.push(id);
            }
        }
        writer.join().unwrap();
        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }
}
