//! Sample-rate / clock-domain bridge for a server-mediated group singing
//! audio timeline ("bucket brigade").
//!
//! This crate is the client-side core sitting between a microphone/player
//! audio graph and a server that mixes many singers onto one timeline: two
//! paired codec pipelines (encode, decode), a request-ordered RPC discipline
//! with background codec workers, a dual-clock accounting model bridging the
//! local hardware sample rate against the canonical 48 kHz codec rate, and
//! the surrounding session lifecycle (start, reset, calibration modes).
//!
//! The Opus codec and resampler, the audio-device worklet, and the HTTP/WS
//! transport to the server are all external collaborators addressed through
//! the traits in [`codec_worker`], [`session`], and [`singer`] — this crate
//! never talks to hardware or a network socket directly.
//!
//! This crate does not install a logger; the host binary does that (e.g.
//! via `env_logger`), the same way `log`-based library crates generally
//! leave that decision to the application.

pub mod calibration;
pub mod chunk;
pub mod clock;
pub mod codec_worker;
pub mod constants;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod framing;
pub mod player;
pub mod session;
pub mod singer;

#[cfg(test)]
mod tests;

pub use calibration::{LatencyCalibrator, VolumeCalibrator};
pub use chunk::{
    check_clock_reference, concat_audio_chunks, concat_placeholder_chunks, AudioChunk,
    CompressedAudioChunk, DecoderInput, EncoderInput, PlaceholderChunk, WireChunk,
};
pub use clock::{round_rate, ClockInterval, ClockReference};
pub use codec_worker::{CodecWorkerChannel, PendingRequestQueue, ThreadCodecWorker};
pub use decoder::{DecoderOutput, DecoderPipeline};
pub use encoder::{EncoderOutput, EncoderPipeline};
pub use error::{CoreError, CoreResult};
pub use framing::{pack_multi, unpack_multi};
pub use player::{
    ClientEvent, ConsumerOutcome, ContextToPlayerMessage, PlayerMessageBus, PlayerMessageConsumer,
    PlayerToContextMessage,
};
pub use session::{PlayerSink, SessionConfig, SessionContext};
pub use singer::{ServerRequest, ServerResponse, ServerTransport, SingerClient, SingerState};
