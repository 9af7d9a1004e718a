//! Immutable audio-interval value types (spec §3, §4.1) and the wire-facing
//! tagged sum type that replaces the source's dynamic "reblessing" (spec §9).

use crate::clock::{ClockInterval, ClockReference};
use crate::error::{CoreError, CoreResult};

/// PCM samples over an interval, always client-referenced.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub interval: ClockInterval,
    pub data: Vec<f32>,
}

impl AudioChunk {
    pub fn new(interval: ClockInterval, data: Vec<f32>) -> Self {
        debug_assert_eq!(
            data.len() as i64,
            interval.length,
            "AudioChunk data length must equal interval length"
        );
        Self { interval, data }
    }
}

/// An opaque packed-multi-packet blob over an interval, always server-referenced.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedAudioChunk {
    pub interval: ClockInterval,
    pub data: Vec<u8>,
}

impl CompressedAudioChunk {
    pub fn new(interval: ClockInterval, data: Vec<u8>) -> Self {
        Self { interval, data }
    }
}

/// An interval carrying no samples: silence, mute, or "not yet started".
/// May be tagged with either reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderChunk {
    pub interval: ClockInterval,
}

impl PlaceholderChunk {
    pub fn new(interval: ClockInterval) -> Self {
        Self { interval }
    }

    pub fn length(&self) -> i64 {
        self.interval.length
    }
}

/// Fails with [`CoreError::ClockReferenceMismatch`] if `interval`'s reference
/// differs from `expected` by variant or rate (spec §4.1).
pub fn check_clock_reference(interval: &ClockInterval, expected: &ClockReference) -> CoreResult<()> {
    if interval.reference != *expected {
        return Err(CoreError::ClockReferenceMismatch {
            expected: expected.name(),
            found: interval.reference.name(),
        });
    }
    Ok(())
}

fn check_contiguous(intervals: &[ClockInterval]) -> CoreResult<()> {
    for pair in intervals.windows(2) {
        if !pair[0].is_contiguous_with(&pair[1]) {
            return Err(CoreError::NonContiguous {
                clock: pair[0].end,
                start: pair[1].start(),
            });
        }
    }
    Ok(())
}

/// Concatenates a non-empty, contiguous, single-reference run of audio
/// chunks into one (spec §4.1).
pub fn concat_audio_chunks(chunks: &[AudioChunk]) -> CoreResult<AudioChunk> {
    let intervals: Vec<ClockInterval> = chunks.iter().map(|c| c.interval).collect();
    let first = intervals.first().ok_or(CoreError::NonContiguous {
        clock: 0,
        start: 0,
    })?;
    check_contiguous(&intervals)?;

    let total_length: i64 = intervals.iter().map(|i| i.length).sum();
    let mut data = Vec::with_capacity(total_length as usize);
    for chunk in chunks {
        data.extend_from_slice(&chunk.data);
    }
    let merged = ClockInterval::new(first.reference, intervals.last().unwrap().end, total_length);
    Ok(AudioChunk::new(merged, data))
}

/// Concatenates a non-empty, contiguous, single-reference run of placeholder
/// chunks into one, summing their lengths (spec §4.1).
pub fn concat_placeholder_chunks(chunks: &[PlaceholderChunk]) -> CoreResult<PlaceholderChunk> {
    let intervals: Vec<ClockInterval> = chunks.iter().map(|c| c.interval).collect();
    let first = intervals.first().ok_or(CoreError::NonContiguous {
        clock: 0,
        start: 0,
    })?;
    check_contiguous(&intervals)?;

    let total_length: i64 = intervals.iter().map(|i| i.length).sum();
    let merged = ClockInterval::new(first.reference, intervals.last().unwrap().end, total_length);
    Ok(PlaceholderChunk::new(merged))
}

/// Input to the encoder pipeline: a contiguous client-referenced stream may
/// interleave real audio and placeholder (silence/absent) intervals.
#[derive(Debug, Clone)]
pub enum EncoderInput {
    Audio(AudioChunk),
    Placeholder(PlaceholderChunk),
}

impl EncoderInput {
    pub fn interval(&self) -> ClockInterval {
        match self {
            EncoderInput::Audio(c) => c.interval,
            EncoderInput::Placeholder(c) => c.interval,
        }
    }
}

/// Input to the decoder pipeline: a contiguous server-referenced stream.
#[derive(Debug, Clone)]
pub enum DecoderInput {
    Compressed(CompressedAudioChunk),
    Placeholder(PlaceholderChunk),
}

impl DecoderInput {
    pub fn interval(&self) -> ClockInterval {
        match self {
            DecoderInput::Compressed(c) => c.interval,
            DecoderInput::Placeholder(c) => c.interval,
        }
    }
}

/// Tagged sum type for inbound wire objects, replacing the source's dynamic
/// prototype-reattachment "reblessing" (spec §9 Design Notes).
#[derive(Debug, Clone)]
pub enum WireChunk {
    Audio(AudioChunk),
    Compressed(CompressedAudioChunk),
    Placeholder(PlaceholderChunk),
}

impl WireChunk {
    pub fn interval(&self) -> ClockInterval {
        match self {
            WireChunk::Audio(c) => c.interval,
            WireChunk::Compressed(c) => c.interval,
            WireChunk::Placeholder(c) => c.interval,
        }
    }

    /// Reinterprets this wire object as encoder input. Fails if it arrived
    /// as a compressed chunk, which the encoder never accepts as input.
    pub fn into_encoder_input(self) -> CoreResult<EncoderInput> {
        match self {
            WireChunk::Audio(c) => Ok(EncoderInput::Audio(c)),
            WireChunk::Placeholder(c) => Ok(EncoderInput::Placeholder(c)),
            WireChunk::Compressed(c) => Err(CoreError::ClockReferenceMismatch {
                expected: "client",
                found: c.interval.reference.name(),
            }),
        }
    }

    /// Reinterprets this wire object as decoder input. Fails if it arrived
    /// as a raw audio chunk, which the decoder never accepts as input.
    pub fn into_decoder_input(self) -> CoreResult<DecoderInput> {
        match self {
            WireChunk::Compressed(c) => Ok(DecoderInput::Compressed(c)),
            WireChunk::Placeholder(c) => Ok(DecoderInput::Placeholder(c)),
            WireChunk::Audio(c) => Err(CoreError::ClockReferenceMismatch {
                expected: "server",
                found: c.interval.reference.name(),
            }),
        }
    }
}
