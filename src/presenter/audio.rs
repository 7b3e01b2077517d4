//! Audio cue with ordered fallbacks.
//!
//! The chain tries one strategy at a time and stops at the first success.
//! Failures are logged and never surface to the caller.

use std::f32::consts::PI;

use anyhow::{bail, Context};

use super::PageHost;

pub const SAMPLE_RATE: u32 = 44_100;
pub const SPOKEN_PHRASE: &str = "ding";

const ATTACK_SECS: f32 = 0.02;
const DECAY_FLOOR: f32 = 0.01;

/// One tone of the synthesized chime
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency: f32,
    pub offset_secs: f32,
    pub duration_secs: f32,
    pub volume: f32,
}

/// C5, E5, G5 staggered by 100ms
pub const CHIME: [Tone; 3] = [
    Tone {
        frequency: 523.25,
        offset_secs: 0.0,
        duration_secs: 0.3,
        volume: 0.08,
    },
    Tone {
        frequency: 659.25,
        offset_secs: 0.1,
        duration_secs: 0.3,
        volume: 0.06,
    },
    Tone {
        frequency: 783.99,
        offset_secs: 0.2,
        duration_secs: 0.4,
        volume: 0.04,
    },
];

pub trait AudioStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn play(&self, host: &dyn PageHost) -> anyhow::Result<()>;
}

/// Envelope gain at `t` seconds into a tone: linear attack, then an
/// exponential ramp down to the floor at the end of the tone.
fn envelope(t: f32, duration: f32, volume: f32) -> f32 {
    if t < 0.0 || t >= duration {
        0.0
    } else if t < ATTACK_SECS {
        volume * t / ATTACK_SECS
    } else {
        let progress = (t - ATTACK_SECS) / (duration - ATTACK_SECS).max(f32::EPSILON);
        volume * (DECAY_FLOOR / volume).powf(progress)
    }
}

/// Mix `tones` into mono 16-bit PCM
pub fn render_tones(tones: &[Tone], sample_rate: u32) -> Vec<i16> {
    let total_secs = tones
        .iter()
        .map(|t| t.offset_secs + t.duration_secs)
        .fold(0.0_f32, f32::max);
    let len = (total_secs * sample_rate as f32).ceil() as usize;

    (0..len)
        .map(|i| {
            let now = i as f32 / sample_rate as f32;
            let mixed: f32 = tones
                .iter()
                .map(|tone| {
                    let t = now - tone.offset_secs;
                    envelope(t, tone.duration_secs, tone.volume)
                        * (2.0 * PI * tone.frequency * t).sin()
                })
                .sum();
            (mixed.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
        })
        .collect()
}

/// Wrap mono 16-bit PCM in a RIFF/WAVE container
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    const CHANNELS: u16 = 1;
    const BITS: u16 = 16;
    let block_align = CHANNELS * BITS / 8;
    let byte_rate = sample_rate * u32::from(block_align);
    let data_len = (samples.len() * 2) as u32;

    let mut out = Vec::with_capacity(44 + samples.len() * 2);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&CHANNELS.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Synthesized C-E-G chime
pub struct ToneSequence {
    wav: Vec<u8>,
}

impl ToneSequence {
    pub fn new(tones: &[Tone]) -> Self {
        Self {
            wav: encode_wav(&render_tones(tones, SAMPLE_RATE), SAMPLE_RATE),
        }
    }
}

impl Default for ToneSequence {
    fn default() -> Self {
        Self::new(&CHIME)
    }
}

impl AudioStrategy for ToneSequence {
    fn name(&self) -> &'static str {
        "tone_sequence"
    }

    fn play(&self, host: &dyn PageHost) -> anyhow::Result<()> {
        host.play_wav(&self.wav).context("chime playback failed")
    }
}

/// Short square-wave blip, encoded once
pub struct EncodedClip {
    wav: Vec<u8>,
}

impl EncodedClip {
    pub fn from_wav(wav: Vec<u8>) -> Self {
        Self { wav }
    }
}

impl Default for EncodedClip {
    fn default() -> Self {
        let sample_rate = 22_050;
        let period = sample_rate / 880;
        let samples: Vec<i16> = (0..sample_rate / 10)
            .map(|i| if (i / (period / 2)) % 2 == 0 { 6_000 } else { -6_000 })
            .collect();
        Self::from_wav(encode_wav(&samples, sample_rate))
    }
}

impl AudioStrategy for EncodedClip {
    fn name(&self) -> &'static str {
        "encoded_clip"
    }

    fn play(&self, host: &dyn PageHost) -> anyhow::Result<()> {
        if self.wav.is_empty() {
            bail!("clip is empty");
        }
        host.play_wav(&self.wav).context("clip playback failed")
    }
}

pub struct SpokenCue {
    phrase: String,
}

impl Default for SpokenCue {
    fn default() -> Self {
        Self {
            phrase: SPOKEN_PHRASE.to_string(),
        }
    }
}

impl AudioStrategy for SpokenCue {
    fn name(&self) -> &'static str {
        "spoken_cue"
    }

    fn play(&self, host: &dyn PageHost) -> anyhow::Result<()> {
        host.speak(&self.phrase).context("speech failed")
    }
}

pub struct AudioChain {
    strategies: Vec<Box<dyn AudioStrategy>>,
}

impl AudioChain {
    pub fn new(strategies: Vec<Box<dyn AudioStrategy>>) -> Self {
        Self { strategies }
    }

    /// Chime, then clip, then spoken cue
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(ToneSequence::default()),
            Box::new(EncodedClip::default()),
            Box::new(SpokenCue::default()),
        ])
    }

    /// Play through `host`; returns the strategy that succeeded, if any
    pub fn play(&self, host: &dyn PageHost) -> Option<&'static str> {
        for strategy in &self.strategies {
            match strategy.play(host) {
                Ok(()) => {
                    tracing::debug!(strategy = strategy.name(), "audio cue played");
                    return Some(strategy.name());
                }
                Err(err) => {
                    tracing::debug!(strategy = strategy.name(), err = %format!("{err:#}"), "audio strategy failed");
                }
            }
        }
        tracing::info!("all audio strategies failed");
        None
    }
}
