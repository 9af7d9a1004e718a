//! Encoder pipeline (spec §4.4): accepts a contiguous client-referenced
//! stream of real or placeholder chunks, emits server-referenced chunks
//! aligned to the Opus frame boundary.

use crate::chunk::{check_clock_reference, AudioChunk, CompressedAudioChunk, EncoderInput, PlaceholderChunk};
use crate::clock::{round_rate, ClockInterval, ClockReference};
use crate::codec_worker::{
    CodecWorkerChannel, EncoderRequestPayload, EncoderResponsePayload, EncoderSetupConfig,
    PendingRequestQueue, WorkerRequest, WorkerResponse,
};
use crate::constants::{DEFAULT_CODEC_RATE, DRIFT_WARN_THRESHOLD_SAMPLES, OPUS_FRAME_MS};
use crate::error::{CoreError, CoreResult};
use crate::framing::pack_multi;

/// Either an emitted compressed audio frame, or a placeholder dimensionally
/// advanced in server-rate terms.
#[derive(Debug, Clone)]
pub enum EncoderOutput {
    Compressed(CompressedAudioChunk),
    Placeholder(PlaceholderChunk),
}

/// Owns the outbound clock pair and the at-most-one queued remainder.
pub struct EncoderPipeline<W> {
    worker: W,
    pending: PendingRequestQueue,
    client_reference: Option<ClockReference>,
    server_reference: Option<ClockReference>,
    client_clock: Option<i64>,
    server_clock: Option<i64>,
    /// At most one buffered signed remainder, in client-rate samples,
    /// produced when a placeholder's length didn't land on an Opus frame
    /// boundary (spec §3 QueuedRemainder, §9 "Negative placeholder remainder").
    queued_remainder: Option<i64>,
}

impl<W> EncoderPipeline<W>
where
    W: CodecWorkerChannel<Request = EncoderRequestPayload, Response = EncoderResponsePayload>,
{
    pub fn new(worker: W) -> Self {
        Self {
            worker,
            pending: PendingRequestQueue::new(),
            client_reference: None,
            server_reference: None,
            client_clock: None,
            server_clock: None,
            queued_remainder: None,
        }
    }

    pub fn is_setup(&self) -> bool {
        self.client_reference.is_some()
    }

    /// Establishes both clock references. Must be called exactly once,
    /// before any other operation. Returns whether the worker reported it
    /// needs to resample.
    pub fn setup(&mut self, client_sampling_rate: i64) -> CoreResult<bool> {
        debug_assert!(!self.is_setup(), "setup must be called exactly once");
        self.client_reference = Some(ClockReference::Client(client_sampling_rate));
        self.server_reference = Some(ClockReference::Server(DEFAULT_CODEC_RATE));

        let request_id = self.pending.push();
        self.worker.send(WorkerRequest {
            request_id,
            payload: EncoderRequestPayload::Setup(EncoderSetupConfig {
                sampling_rate: client_sampling_rate,
                num_of_channels: 1,
                frame_duration: OPUS_FRAME_MS,
            }),
        })?;

        match self.worker.recv()? {
            WorkerResponse::Success {
                request_id: got,
                payload: EncoderResponsePayload::Setup { resampling },
            } => {
                self.pending.check_and_pop(got)?;
                Ok(resampling)
            }
            WorkerResponse::Success { request_id: got, .. } => {
                self.pending.check_and_pop(got)?;
                Err(CoreError::SetupFailed { status: -1 })
            }
            WorkerResponse::Failure { request_id: got, status } => {
                self.pending.check_and_pop(got)?;
                Err(CoreError::SetupFailed { status })
            }
            WorkerResponse::Exception { exception } => Err(CoreError::CodecException { exception }),
        }
    }

    /// Discards clock state and the queued remainder. Idempotent.
    pub fn reset(&mut self) {
        self.client_clock = None;
        self.server_clock = None;
        self.queued_remainder = None;
        self.pending.clear();
        if self.is_setup() {
            let _ = self.worker.send(WorkerRequest {
                request_id: self.pending.push(),
                payload: EncoderRequestPayload::Reset,
            });
            // The reset response is drained but its content is immaterial;
            // a stale response here cannot resurrect clock state because we
            // already cleared it above and the pending queue was cleared too.
            let _ = self.worker.recv();
            self.pending.clear();
        }
    }

    fn take_remainder(&mut self) -> i64 {
        self.queued_remainder.take().unwrap_or(0)
    }

    pub fn encode_chunk(&mut self, input: EncoderInput) -> CoreResult<EncoderOutput> {
        let client_ref = self
            .client_reference
            .expect("encode_chunk called before setup");
        let server_ref = self
            .server_reference
            .expect("encode_chunk called before setup");

        check_clock_reference(&input.interval(), &client_ref)?;

        match input {
            EncoderInput::Placeholder(chunk) => {
                let remainder = self.take_remainder();
                let folded_length = (chunk.length() + remainder).max(0);
                let folded = PlaceholderChunk::new(ClockInterval::new(
                    chunk.interval.reference,
                    chunk.interval.end,
                    folded_length,
                ));
                self.encode_placeholder(folded, client_ref, server_ref)
            }
            EncoderInput::Audio(chunk) => {
                let remainder = self.take_remainder();
                self.encode_audio(chunk, client_ref, server_ref, remainder)
            }
        }
    }

    fn encode_placeholder(
        &mut self,
        chunk: PlaceholderChunk,
        client_ref: ClockReference,
        server_ref: ClockReference,
    ) -> CoreResult<EncoderOutput> {
        if self.client_clock.is_some() {
            return Err(CoreError::ClockStartedPlaceholder);
        }

        let r_s = server_ref.rate();
        let r_c = client_ref.rate();
        let result_length = round_rate(chunk.length(), r_s, r_c);
        let opus_samples = (OPUS_FRAME_MS as i64) * r_s / 1000;
        let frames = if opus_samples == 0 {
            0
        } else {
            (result_length as f64 / opus_samples as f64).round() as i64
        };
        let send_length = frames * opus_samples;
        let leftover_length = round_rate(result_length - send_length, r_c, r_s);
        if leftover_length != 0 {
            self.queued_remainder = Some(leftover_length);
        }

        // Anchor on the input's *start*, not its end: a snap-up borrows
        // samples from the following input (queued as a negative
        // remainder), so the emitted interval must stay contiguous with
        // where the input began, not where it nominally ended.
        let out_start = round_rate(chunk.interval.start(), r_s, r_c);
        let out_end = out_start + send_length;
        let out_interval = ClockInterval::new(server_ref, out_end, send_length);
        Ok(EncoderOutput::Placeholder(PlaceholderChunk::new(out_interval)))
    }

    fn encode_audio(
        &mut self,
        chunk: AudioChunk,
        client_ref: ClockReference,
        server_ref: ClockReference,
        remainder: i64,
    ) -> CoreResult<EncoderOutput> {
        let effective_start = chunk.interval.start() - remainder;

        if self.client_clock.is_none() {
            self.client_clock = Some(effective_start);
            self.server_clock = Some(round_rate(effective_start, server_ref.rate(), client_ref.rate()));
        }

        let client_clock = self.client_clock.expect("client clock just established");
        if effective_start != client_clock {
            return Err(CoreError::NonContiguous {
                clock: client_clock,
                start: effective_start,
            });
        }
        self.client_clock = Some(chunk.interval.end);

        let request_id = self.pending.push();
        self.worker.send(WorkerRequest {
            request_id,
            payload: EncoderRequestPayload::Encode {
                samples: chunk.data.clone(),
            },
        })?;

        let (packets, samples_encoded, buffered_samples) = match self.worker.recv()? {
            WorkerResponse::Success {
                request_id: got,
                payload:
                    EncoderResponsePayload::Encode {
                        packets,
                        samples_encoded,
                        buffered_samples,
                    },
            } => {
                self.pending.check_and_pop(got)?;
                (packets, samples_encoded, buffered_samples)
            }
            WorkerResponse::Success { request_id: got, .. } => {
                self.pending.check_and_pop(got)?;
                return Err(CoreError::CodecRpcFailed { status: -1 });
            }
            WorkerResponse::Failure { request_id: got, status } => {
                self.pending.check_and_pop(got)?;
                return Err(CoreError::CodecRpcFailed { status });
            }
            WorkerResponse::Exception { exception } => {
                return Err(CoreError::CodecException { exception })
            }
        };

        let server_clock = self.server_clock.expect("server clock just established") + samples_encoded;
        self.server_clock = Some(server_clock);

        let adjusted = server_clock + buffered_samples;
        let hypothetical_client = round_rate(adjusted, client_ref.rate(), server_ref.rate());
        let drift = (chunk.interval.end - hypothetical_client).abs();
        if drift > DRIFT_WARN_THRESHOLD_SAMPLES {
            log::warn!(
                "encoder drift check exceeded threshold: client end {} vs hypothetical {} ({} samples)",
                chunk.interval.end,
                hypothetical_client,
                drift
            );
        }

        let packed = pack_multi(&packets);
        let out_interval = ClockInterval::new(server_ref, server_clock, samples_encoded);
        Ok(EncoderOutput::Compressed(CompressedAudioChunk::new(
            out_interval,
            packed,
        )))
    }
}
