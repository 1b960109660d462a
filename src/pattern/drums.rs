//! Drum lane names and the synthesis voices they resolve to.
//!
//! Lane names are free text from the pattern source ("Kick", "closed hi-hat",
//! "Bass Drum"). They are normalized and looked up once in a fixed alias
//! table; anything unknown plays as generic percussion.

use serde::{Deserialize, Serialize};

/// Pitch register of a tom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TomRegister {
    Low,
    Mid,
    High,
}

impl TomRegister {
    /// Starting pitch of the tom sweep in Hz.
    pub fn start_frequency(self) -> f32 {
        match self {
            TomRegister::Low => 120.0,
            TomRegister::Mid => 200.0,
            TomRegister::High => 300.0,
        }
    }
}

/// Closed set of drum synthesis voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrumVoice {
    Kick,
    Snare,
    Clap,
    HiHat { open: bool },
    Cymbal { ride: bool },
    Tom(TomRegister),
    Metallic,
    GenericPercussion,
}

/// Normalized lane name to voice.
const ALIASES: &[(&str, DrumVoice)] = &[
    ("kick", DrumVoice::Kick),
    ("kick_drum", DrumVoice::Kick),
    ("bass_drum", DrumVoice::Kick),
    ("bassdrum", DrumVoice::Kick),
    ("bd", DrumVoice::Kick),
    ("snare", DrumVoice::Snare),
    ("snare_drum", DrumVoice::Snare),
    ("sd", DrumVoice::Snare),
    ("rimshot", DrumVoice::Snare),
    ("rim", DrumVoice::Snare),
    ("clap", DrumVoice::Clap),
    ("hand_clap", DrumVoice::Clap),
    ("handclap", DrumVoice::Clap),
    ("cp", DrumVoice::Clap),
    ("hihat", DrumVoice::HiHat { open: false }),
    ("hi_hat", DrumVoice::HiHat { open: false }),
    ("hat", DrumVoice::HiHat { open: false }),
    ("hh", DrumVoice::HiHat { open: false }),
    ("ch", DrumVoice::HiHat { open: false }),
    ("closed_hihat", DrumVoice::HiHat { open: false }),
    ("closed_hi_hat", DrumVoice::HiHat { open: false }),
    ("closed_hat", DrumVoice::HiHat { open: false }),
    ("open_hihat", DrumVoice::HiHat { open: true }),
    ("open_hi_hat", DrumVoice::HiHat { open: true }),
    ("open_hat", DrumVoice::HiHat { open: true }),
    ("oh", DrumVoice::HiHat { open: true }),
    ("cymbal", DrumVoice::Cymbal { ride: false }),
    ("crash", DrumVoice::Cymbal { ride: false }),
    ("crash_cymbal", DrumVoice::Cymbal { ride: false }),
    ("ride", DrumVoice::Cymbal { ride: true }),
    ("ride_cymbal", DrumVoice::Cymbal { ride: true }),
    ("tom", DrumVoice::Tom(TomRegister::Mid)),
    ("mid_tom", DrumVoice::Tom(TomRegister::Mid)),
    ("tom_mid", DrumVoice::Tom(TomRegister::Mid)),
    ("low_tom", DrumVoice::Tom(TomRegister::Low)),
    ("tom_low", DrumVoice::Tom(TomRegister::Low)),
    ("floor_tom", DrumVoice::Tom(TomRegister::Low)),
    ("high_tom", DrumVoice::Tom(TomRegister::High)),
    ("hi_tom", DrumVoice::Tom(TomRegister::High)),
    ("tom_high", DrumVoice::Tom(TomRegister::High)),
    ("cowbell", DrumVoice::Metallic),
    ("bell", DrumVoice::Metallic),
    ("metal", DrumVoice::Metallic),
    ("metallic", DrumVoice::Metallic),
    ("percussion", DrumVoice::GenericPercussion),
    ("perc", DrumVoice::GenericPercussion),
];

/// Lower-cases a lane name and joins its words with underscores.
///
/// Hyphens count as word separators, so "Closed Hi-Hat" and "closed_hi_hat"
/// normalize to the same key.
///
/// # Examples
///
/// ```
/// use loopsynth::pattern::normalize_voice_name;
///
/// assert_eq!(normalize_voice_name("  Closed Hi-Hat "), "closed_hi_hat");
/// ```
pub fn normalize_voice_name(name: &str) -> String {
    name.trim()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

impl DrumVoice {
    /// Resolves a free-text lane name, falling back to generic percussion.
    pub fn resolve(name: &str) -> Self {
        Self::lookup(name).unwrap_or(DrumVoice::GenericPercussion)
    }

    /// Resolves a lane name through the alias table only.
    pub fn lookup(name: &str) -> Option<Self> {
        let key = normalize_voice_name(name);
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(_, voice)| *voice)
    }
}
