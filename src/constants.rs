//! Bit-exact constants from spec §6.6.

/// Starting pacing target for the singer client's outbound batch size, in milliseconds.
pub const INITIAL_MS_PER_BATCH: u32 = 600;

/// Upper bound the pacing parameter is allowed to grow to, in milliseconds.
pub const MAX_MS_PER_BATCH: u32 = 900;

/// Duration of one Opus frame, in milliseconds. Permissible Opus values are
/// 2.5, 5, 10, 20, 40, 60; this crate always operates at 60ms.
pub const OPUS_FRAME_MS: u32 = 60;

/// Frame size of a single worklet-delivered microphone buffer, in samples.
pub const WORKLET_FRAME_SAMPLES: usize = 128;

/// Drift-check warning threshold, in samples.
pub const DRIFT_WARN_THRESHOLD_SAMPLES: i64 = 5;

/// Decoder sanity-check tolerance, in samples.
pub const DECODE_LENGTH_TOLERANCE_SAMPLES: i64 = 5;

/// Latency calibration success window, in milliseconds.
pub const CALIBRATION_SUCCESS_WINDOW_MS: f64 = 2.0;

/// Minimum number of latency samples observed before calibration can terminate.
pub const CALIBRATION_SAMPLE_MINIMUM: u32 = 7;

/// Default codec (wire/server) sample rate.
pub const DEFAULT_CODEC_RATE: i64 = 48_000;

/// Opus's own added encode/decode latency, in milliseconds.
pub const OPUS_LATENCY_MS: f64 = 6.5;

/// Added latency contributed by a resampler, per direction, in milliseconds.
pub const RESAMPLER_LATENCY_MS: f64 = 1.8;
