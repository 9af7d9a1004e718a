//! End-to-end integration tests tying the encoder and decoder pipelines
//! together across the wire format, the way a real session chains them:
//! mic samples in on one clock domain, compressed chunks over the wire,
//! PCM back out on the other. The per-module unit tests already cover each
//! pipeline's scenarios (spec §8 S1-S6) in isolation; this module checks
//! the two halves agree when chained end to end.

use crate::chunk::{AudioChunk, DecoderInput, EncoderInput, PlaceholderChunk};
use crate::clock::ClockInterval;
use crate::codec_worker::{
    DecoderRequestPayload, DecoderResponsePayload, EncoderRequestPayload, EncoderResponsePayload,
    ThreadCodecWorker, WorkerResponse,
};
use crate::decoder::{DecoderOutput, DecoderPipeline};
use crate::encoder::{EncoderOutput, EncoderPipeline};

type EncoderWorker = ThreadCodecWorker<EncoderRequestPayload, EncoderResponsePayload>;
type DecoderWorker = ThreadCodecWorker<DecoderRequestPayload, DecoderResponsePayload>;

/// A lossless passthrough codec: "encoding" just hands the raw f32 bytes
/// back as one packet, "decoding" reverses it. Enough to check the clock
/// and framing plumbing without a real Opus dependency.
fn passthrough_encoder() -> EncoderWorker {
    ThreadCodecWorker::spawn(|req| match req.payload {
        EncoderRequestPayload::Setup(_) => WorkerResponse::Success {
            request_id: req.request_id,
            payload: EncoderResponsePayload::Setup { resampling: false },
        },
        EncoderRequestPayload::Encode { samples } => {
            let mut bytes = Vec::with_capacity(samples.len() * 4);
            for s in &samples {
                bytes.extend_from_slice(&s.to_le_bytes());
            }
            WorkerResponse::Success {
                request_id: req.request_id,
                payload: EncoderResponsePayload::Encode {
                    packets: vec![bytes],
                    samples_encoded: samples.len() as i64,
                    buffered_samples: 0,
                },
            }
        }
        EncoderRequestPayload::Reset => WorkerResponse::Success {
            request_id: req.request_id,
            payload: EncoderResponsePayload::Reset,
        },
    })
}

fn passthrough_decoder() -> DecoderWorker {
    ThreadCodecWorker::spawn(|req| match req.payload {
        DecoderRequestPayload::Setup(_) => WorkerResponse::Success {
            request_id: req.request_id,
            payload: DecoderResponsePayload::Setup,
        },
        DecoderRequestPayload::Decode { data } => {
            let samples = data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            WorkerResponse::Success {
                request_id: req.request_id,
                payload: DecoderResponsePayload::Decode { samples },
            }
        }
        DecoderRequestPayload::Reset => WorkerResponse::Success {
            request_id: req.request_id,
            payload: DecoderResponsePayload::Reset,
        },
    })
}

fn client_interval(end: i64, length: i64) -> ClockInterval {
    ClockInterval::new(crate::clock::ClockReference::Client(48_000), end, length)
}

/// Mic samples at native 48kHz flow through the encoder, across the wire
/// format, through the decoder, and come back bit-identical and with the
/// client clock advanced by exactly the samples sent.
#[test]
fn round_trip_preserves_samples_and_clock_at_native_rate() {
    let mut encoder = EncoderPipeline::new(passthrough_encoder());
    encoder.setup(48_000).unwrap();
    let mut decoder = DecoderPipeline::new(passthrough_decoder());
    decoder.setup(48_000).unwrap();

    let mut client_clock_sent = 0i64;
    let mut client_clock_received = 0i64;
    for i in 0..4i64 {
        let samples: Vec<f32> = (0..2880).map(|n| ((i * 2880 + n) as f32) * 0.001).collect();
        let chunk = AudioChunk::new(
            client_interval(client_clock_sent + 2880, 2880),
            samples.clone(),
        );
        client_clock_sent += 2880;

        let encoded = match encoder.encode_chunk(EncoderInput::Audio(chunk)).unwrap() {
            EncoderOutput::Compressed(c) => c,
            EncoderOutput::Placeholder(_) => panic!("expected compressed output"),
        };

        let decoded = match decoder
            .decode_chunk(DecoderInput::Compressed(encoded))
            .unwrap()
        {
            DecoderOutput::Audio(a) => a,
            DecoderOutput::Placeholder(_) => panic!("expected audio output"),
        };

        assert_eq!(decoded.data, samples);
        client_clock_received += decoded.interval.length;
        assert_eq!(decoded.interval.end, client_clock_received);
    }

    assert_eq!(client_clock_sent, client_clock_received);
}

/// A placeholder interval at the start of a session should flow through
/// both pipelines without starting either clock, exactly mirroring the
/// encoder's own S4 behavior end to end.
#[test]
fn placeholder_round_trip_does_not_start_clocks() {
    let mut encoder = EncoderPipeline::new(passthrough_encoder());
    encoder.setup(48_000).unwrap();
    let mut decoder = DecoderPipeline::new(passthrough_decoder());
    decoder.setup(48_000).unwrap();

    let placeholder = PlaceholderChunk::new(client_interval(2880, 2880));
    let encoded = match encoder
        .encode_chunk(EncoderInput::Placeholder(placeholder))
        .unwrap()
    {
        EncoderOutput::Placeholder(p) => p,
        EncoderOutput::Compressed(_) => panic!("expected placeholder output"),
    };
    assert_eq!(encoded.length(), 2880);

    let decoded = match decoder
        .decode_chunk(DecoderInput::Placeholder(encoded))
        .unwrap()
    {
        DecoderOutput::Placeholder(p) => p,
        DecoderOutput::Audio(_) => panic!("expected placeholder output"),
    };
    assert_eq!(decoded.length(), 2880);

    let audio = AudioChunk::new(client_interval(5760, 2880), vec![0.0; 2880]);
    let encoded_audio = match encoder.encode_chunk(EncoderInput::Audio(audio)).unwrap() {
        EncoderOutput::Compressed(c) => c,
        EncoderOutput::Placeholder(_) => panic!("expected compressed output"),
    };
    assert_eq!(encoded_audio.interval.end, 5760);
}

/// Resetting both pipelines mid-stream and resuming at a new clock origin
/// must not resurrect the old clock state on either side.
#[test]
fn reset_on_both_pipelines_allows_resuming_at_a_new_origin() {
    let mut encoder = EncoderPipeline::new(passthrough_encoder());
    encoder.setup(48_000).unwrap();
    let mut decoder = DecoderPipeline::new(passthrough_decoder());
    decoder.setup(48_000).unwrap();

    let chunk = AudioChunk::new(client_interval(2880, 2880), vec![0.5; 2880]);
    let encoded = match encoder.encode_chunk(EncoderInput::Audio(chunk)).unwrap() {
        EncoderOutput::Compressed(c) => c,
        EncoderOutput::Placeholder(_) => panic!("expected compressed output"),
    };
    decoder
        .decode_chunk(DecoderInput::Compressed(encoded))
        .unwrap();

    encoder.reset();
    decoder.reset();

    let restarted = AudioChunk::new(client_interval(1000, 1000), vec![0.25; 1000]);
    let encoded = match encoder
        .encode_chunk(EncoderInput::Audio(restarted))
        .unwrap()
    {
        EncoderOutput::Compressed(c) => c,
        EncoderOutput::Placeholder(_) => panic!("expected compressed output"),
    };
    assert_eq!(encoded.interval.end, 1000);

    let decoded = match decoder
        .decode_chunk(DecoderInput::Compressed(encoded))
        .unwrap()
    {
        DecoderOutput::Audio(a) => a,
        DecoderOutput::Placeholder(_) => panic!("expected audio output"),
    };
    assert_eq!(decoded.interval.end, 1000);
    assert_eq!(decoded.data, vec![0.25; 1000]);
}
