use serde::{Deserialize, Serialize};

use crate::error::{MetronomeError, Result};

pub const DEFAULT_BEATS: usize = 4;

/// Accent category of a beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeatKind {
    #[default]
    Normal,
    Accented,
    Soft,
    Muted,
}

impl BeatKind {
    /// Next kind in the toggle cycle: Normal -> Accented -> Soft -> Muted -> Normal
    pub fn next(self) -> Self {
        match self {
            BeatKind::Normal => BeatKind::Accented,
            BeatKind::Accented => BeatKind::Soft,
            BeatKind::Soft => BeatKind::Muted,
            BeatKind::Muted => BeatKind::Normal,
        }
    }

    pub fn is_audible(self) -> bool {
        self != BeatKind::Muted
    }

    pub fn label(self) -> &'static str {
        match self {
            BeatKind::Normal => "normal",
            BeatKind::Accented => "accented",
            BeatKind::Soft => "soft",
            BeatKind::Muted => "muted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Beat {
    pub kind: BeatKind,
    /// Rendering hint only: start a new row after this beat.
    pub layout_break: bool,
}

impl Beat {
    pub fn new(kind: BeatKind) -> Self {
        Self {
            kind,
            layout_break: false,
        }
    }
}

/// Ordered, never-empty sequence of beats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Beat>", into = "Vec<Beat>")]
pub struct BeatPattern {
    beats: Vec<Beat>,
}

impl BeatPattern {
    pub fn new(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(MetronomeError::InvalidLength(len));
        }
        Ok(Self {
            beats: vec![Beat::default(); len],
        })
    }

    pub fn from_beats(beats: Vec<Beat>) -> Result<Self> {
        if beats.is_empty() {
            return Err(MetronomeError::InvalidPattern);
        }
        Ok(Self { beats })
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    // Always false; kept for clippy's len_without_is_empty.
    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    /// Truncate or extend with default beats. Beats below the new length are untouched.
    pub fn resize(&mut self, new_len: usize) -> Result<()> {
        if new_len == 0 {
            return Err(MetronomeError::InvalidLength(new_len));
        }
        self.beats.resize(new_len, Beat::default());
        Ok(())
    }

    pub fn toggle_kind(&mut self, index: usize) -> Result<BeatKind> {
        let beat = self.beat_mut(index)?;
        beat.kind = beat.kind.next();
        Ok(beat.kind)
    }

    pub fn toggle_layout_break(&mut self, index: usize) -> Result<bool> {
        let beat = self.beat_mut(index)?;
        beat.layout_break = !beat.layout_break;
        Ok(beat.layout_break)
    }

    pub fn beat_at(&self, index: usize) -> Result<Beat> {
        self.beats
            .get(index)
            .copied()
            .ok_or(MetronomeError::IndexOutOfRange {
                index,
                len: self.beats.len(),
            })
    }

    pub fn beats(&self) -> &[Beat] {
        &self.beats
    }

    pub fn iter(&self) -> impl Iterator<Item = &Beat> {
        self.beats.iter()
    }

    fn beat_mut(&mut self, index: usize) -> Result<&mut Beat> {
        let len = self.beats.len();
        self.beats
            .get_mut(index)
            .ok_or(MetronomeError::IndexOutOfRange { index, len })
    }
}

impl Default for BeatPattern {
    fn default() -> Self {
        Self {
            beats: vec![Beat::default(); DEFAULT_BEATS],
        }
    }
}

impl TryFrom<Vec<Beat>> for BeatPattern {
    type Error = MetronomeError;

    fn try_from(beats: Vec<Beat>) -> Result<Self> {
        Self::from_beats(beats)
    }
}

impl From<BeatPattern> for Vec<Beat> {
    fn from(pattern: BeatPattern) -> Self {
        pattern.beats
    }
}
