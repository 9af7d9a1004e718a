//! Decoder pipeline (spec §4.5): mirror of the encoder pipeline. Accepts a
//! contiguous server-referenced stream of compressed or placeholder chunks,
//! emits client-referenced PCM chunks. No sub-frame remainder buffering —
//! frame boundaries arrive already aligned from the server.

use crate::chunk::{check_clock_reference, AudioChunk, CompressedAudioChunk, DecoderInput, PlaceholderChunk};
use crate::clock::{round_rate, ClockInterval, ClockReference};
use crate::codec_worker::{
    CodecWorkerChannel, DecoderRequestPayload, DecoderResponsePayload, DecoderSetupConfig,
    PendingRequestQueue, WorkerRequest, WorkerResponse,
};
use crate::constants::{DECODE_LENGTH_TOLERANCE_SAMPLES, DEFAULT_CODEC_RATE};
use crate::error::{CoreError, CoreResult};
use crate::framing::unpack_multi;

#[derive(Debug, Clone)]
pub enum DecoderOutput {
    Audio(AudioChunk),
    Placeholder(PlaceholderChunk),
}

pub struct DecoderPipeline<W> {
    worker: W,
    pending: PendingRequestQueue,
    client_reference: Option<ClockReference>,
    server_reference: Option<ClockReference>,
    client_clock: Option<i64>,
    server_clock: Option<i64>,
    /// When true (the default), a decode whose length deviates from the
    /// expected dimensional conversion by the tolerance fails outright
    /// rather than merely logging (spec §4.5 step 4, "strict mode").
    strict_length_check: bool,
}

impl<W> DecoderPipeline<W>
where
    W: CodecWorkerChannel<Request = DecoderRequestPayload, Response = DecoderResponsePayload>,
{
    pub fn new(worker: W) -> Self {
        Self {
            worker,
            pending: PendingRequestQueue::new(),
            client_reference: None,
            server_reference: None,
            client_clock: None,
            server_clock: None,
            strict_length_check: true,
        }
    }

    pub fn set_strict_length_check(&mut self, strict: bool) {
        self.strict_length_check = strict;
    }

    pub fn is_setup(&self) -> bool {
        self.client_reference.is_some()
    }

    pub fn setup(&mut self, client_sampling_rate: i64) -> CoreResult<()> {
        debug_assert!(!self.is_setup(), "setup must be called exactly once");
        self.client_reference = Some(ClockReference::Client(client_sampling_rate));
        self.server_reference = Some(ClockReference::Server(DEFAULT_CODEC_RATE));

        let request_id = self.pending.push();
        self.worker.send(WorkerRequest {
            request_id,
            payload: DecoderRequestPayload::Setup(DecoderSetupConfig {
                sampling_rate: client_sampling_rate,
                num_of_channels: 1,
            }),
        })?;

        match self.worker.recv()? {
            WorkerResponse::Success { request_id: got, .. } => {
                self.pending.check_and_pop(got)?;
                Ok(())
            }
            WorkerResponse::Failure { request_id: got, status } => {
                self.pending.check_and_pop(got)?;
                Err(CoreError::SetupFailed { status })
            }
            WorkerResponse::Exception { exception } => Err(CoreError::CodecException { exception }),
        }
    }

    pub fn reset(&mut self) {
        self.client_clock = None;
        self.server_clock = None;
        self.pending.clear();
        if self.is_setup() {
            let _ = self.worker.send(WorkerRequest {
                request_id: self.pending.push(),
                payload: DecoderRequestPayload::Reset,
            });
            let _ = self.worker.recv();
            self.pending.clear();
        }
    }

    pub fn decode_chunk(&mut self, input: DecoderInput) -> CoreResult<DecoderOutput> {
        let client_ref = self
            .client_reference
            .expect("decode_chunk called before setup");
        let server_ref = self
            .server_reference
            .expect("decode_chunk called before setup");

        check_clock_reference(&input.interval(), &server_ref)?;

        match input {
            DecoderInput::Placeholder(chunk) => self.decode_placeholder(chunk, client_ref, server_ref),
            DecoderInput::Compressed(chunk) => self.decode_compressed(chunk, client_ref, server_ref),
        }
    }

    fn decode_placeholder(
        &mut self,
        chunk: PlaceholderChunk,
        client_ref: ClockReference,
        server_ref: ClockReference,
    ) -> CoreResult<DecoderOutput> {
        if self.server_clock.is_some() {
            return Err(CoreError::ClockStartedPlaceholder);
        }

        let r_s = server_ref.rate();
        let r_c = client_ref.rate();
        let result_length = round_rate(chunk.length(), r_c, r_s);
        let out_end = round_rate(chunk.interval.end, r_c, r_s);
        let out_interval = ClockInterval::new(client_ref, out_end, result_length);
        Ok(DecoderOutput::Placeholder(PlaceholderChunk::new(out_interval)))
    }

    fn decode_compressed(
        &mut self,
        chunk: CompressedAudioChunk,
        client_ref: ClockReference,
        server_ref: ClockReference,
    ) -> CoreResult<DecoderOutput> {
        if self.server_clock.is_none() {
            self.server_clock = Some(chunk.interval.start());
            self.client_clock = Some(round_rate(
                chunk.interval.start(),
                client_ref.rate(),
                server_ref.rate(),
            ));
        }

        let server_clock = self.server_clock.expect("server clock just established");
        if chunk.interval.start() != server_clock {
            return Err(CoreError::NonContiguous {
                clock: server_clock,
                start: chunk.interval.start(),
            });
        }
        self.server_clock = Some(chunk.interval.end);

        let packets = unpack_multi(&chunk.data)?;

        // Dispatch every per-packet decode request before awaiting any
        // response (spec §5): otherwise decoding two overlapping chunks
        // could interleave packets between pipelines.
        let mut request_ids = Vec::with_capacity(packets.len());
        for packet in &packets {
            let request_id = self.pending.push();
            self.worker.send(WorkerRequest {
                request_id,
                payload: DecoderRequestPayload::Decode { data: packet.clone() },
            })?;
            request_ids.push(request_id);
        }

        let mut samples = Vec::new();
        for _ in &request_ids {
            match self.worker.recv()? {
                WorkerResponse::Success {
                    request_id: got,
                    payload: DecoderResponsePayload::Decode { samples: s },
                } => {
                    self.pending.check_and_pop(got)?;
                    samples.extend(s);
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
            }
        }

        let expected_length = round_rate(chunk.interval.length, client_ref.rate(), server_ref.rate());
        let actual = samples.len() as i64;
        let deviation = (expected_length - actual).abs();
        if deviation >= DECODE_LENGTH_TOLERANCE_SAMPLES {
            if self.strict_length_check {
                return Err(CoreError::DecodeLengthMismatch {
                    expected: expected_length,
                    actual,
                });
            }
            log::warn!(
                "decoder length mismatch outside strict mode: expected {expected_length}, got {actual}"
            );
        }

        let client_start = self.client_clock.expect("client clock just established");
        let client_end = client_start + actual;
        self.client_clock = Some(client_end);
        let out_interval = ClockInterval::new(client_ref, client_end, actual);
        Ok(DecoderOutput::Audio(AudioChunk::new(out_interval, samples)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec_worker::ThreadCodecWorker;
    use crate::framing::pack_multi;

    type TestWorker = ThreadCodecWorker<DecoderRequestPayload, DecoderResponsePayload>;

    fn echo_worker() -> TestWorker {
        ThreadCodecWorker::spawn(|req| match req.payload {
            DecoderRequestPayload::Setup(_) => WorkerResponse::Success {
                request_id: req.request_id,
                payload: DecoderResponsePayload::Setup,
            },
            DecoderRequestPayload::Decode { data } => WorkerResponse::Success {
                request_id: req.request_id,
                payload: DecoderResponsePayload::Decode {
                    samples: vec![0.0; data.len().max(1)],
                },
            },
            DecoderRequestPayload::Reset => WorkerResponse::Success {
                request_id: req.request_id,
                payload: DecoderResponsePayload::Reset,
            },
        })
    }

    fn server_interval(end: i64, length: i64) -> ClockInterval {
        ClockInterval::new(ClockReference::Server(48_000), end, length)
    }

    #[test]
    fn decodes_a_compressed_chunk_into_pcm() {
        let worker = ThreadCodecWorker::spawn(|req| match req.payload {
            DecoderRequestPayload::Setup(_) => WorkerResponse::Success {
                request_id: req.request_id,
                payload: DecoderResponsePayload::Setup,
            },
            DecoderRequestPayload::Decode { .. } => WorkerResponse::Success {
                request_id: req.request_id,
                payload: DecoderResponsePayload::Decode {
                    samples: vec![0.0; 2880],
                },
            },
            DecoderRequestPayload::Reset => WorkerResponse::Success {
                request_id: req.request_id,
                payload: DecoderResponsePayload::Reset,
            },
        });
        let mut pipeline = DecoderPipeline::new(worker);
        pipeline.setup(48_000).unwrap();

        let packed = pack_multi(&[vec![0xAA, 0xBB]]);
        let input = CompressedAudioChunk::new(server_interval(2880, 2880), packed);
        let out = pipeline
            .decode_chunk(DecoderInput::Compressed(input))
            .unwrap();
        match out {
            DecoderOutput::Audio(a) => {
                assert_eq!(a.interval.end, 2880);
                assert_eq!(a.data.len(), 2880);
            }
            _ => panic!("expected audio output"),
        }
    }

    #[test]
    fn non_contiguous_compressed_chunks_are_rejected() {
        let mut pipeline = DecoderPipeline::new(echo_worker());
        pipeline.setup(48_000).unwrap();

        let packed = pack_multi(&[vec![0u8; 10]]);
        let first = CompressedAudioChunk::new(server_interval(2880, 2880), packed.clone());
        pipeline
            .decode_chunk(DecoderInput::Compressed(first))
            .unwrap();

        let second = CompressedAudioChunk::new(server_interval(5761, 2881), packed);
        let err = pipeline
            .decode_chunk(DecoderInput::Compressed(second))
            .unwrap_err();
        assert!(matches!(err, CoreError::NonContiguous { .. }));
    }

    #[test]
    fn reference_mismatch_is_rejected() {
        let mut pipeline = DecoderPipeline::new(echo_worker());
        pipeline.setup(48_000).unwrap();

        let wrong = PlaceholderChunk::new(ClockInterval::new(
            ClockReference::Client(48_000),
            2880,
            2880,
        ));
        let err = pipeline
            .decode_chunk(DecoderInput::Placeholder(wrong))
            .unwrap_err();
        assert!(matches!(err, CoreError::ClockReferenceMismatch { .. }));
    }

    #[test]
    fn placeholder_dimensions_without_frame_snapping() {
        let mut pipeline = DecoderPipeline::new(echo_worker());
        pipeline.setup(44_100).unwrap();

        let placeholder = PlaceholderChunk::new(server_interval(2880, 2880));
        let out = pipeline
            .decode_chunk(DecoderInput::Placeholder(placeholder))
            .unwrap();
        match out {
            DecoderOutput::Placeholder(p) => {
                assert_eq!(p.length(), round_rate(2880, 44_100, 48_000));
            }
            _ => panic!("expected placeholder output"),
        }
    }

    #[test]
    fn reset_is_idempotent() {
        let mut pipeline = DecoderPipeline::new(echo_worker());
        pipeline.setup(48_000).unwrap();
        let packed = pack_multi(&[vec![0u8; 4]]);
        let first = CompressedAudioChunk::new(server_interval(2880, 2880), packed);
        pipeline
            .decode_chunk(DecoderInput::Compressed(first))
            .unwrap();

        pipeline.reset();
        assert!(pipeline.client_clock.is_none());
        assert!(pipeline.server_clock.is_none());
        pipeline.reset();
        assert!(pipeline.client_clock.is_none());
        assert!(pipeline.server_clock.is_none());
    }

    #[test]
    fn strict_mode_rejects_decode_length_mismatch() {
        let worker = ThreadCodecWorker::spawn(|req| match req.payload {
            DecoderRequestPayload::Setup(_) => WorkerResponse::Success {
                request_id: req.request_id,
                payload: DecoderResponsePayload::Setup,
            },
            DecoderRequestPayload::Decode { .. } => WorkerResponse::Success {
                request_id: req.request_id,
                payload: DecoderResponsePayload::Decode {
                    samples: vec![0.0; 10], // wildly short vs. expected 2880
                },
            },
            DecoderRequestPayload::Reset => WorkerResponse::Success {
                request_id: req.request_id,
                payload: DecoderResponsePayload::Reset,
            },
        });
        let mut pipeline = DecoderPipeline::new(worker);
        pipeline.setup(48_000).unwrap();

        let packed = pack_multi(&[vec![0u8; 4]]);
        let input = CompressedAudioChunk::new(server_interval(2880, 2880), packed);
        let err = pipeline
            .decode_chunk(DecoderInput::Compressed(input))
            .unwrap_err();
        assert!(matches!(err, CoreError::DecodeLengthMismatch { .. }));
    }
}
