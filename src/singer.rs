//! Singer client (spec §4.7): the outer state machine tying the mic-frame
//! stream through encoder → server → decoder → playback, plus metadata
//! plumbing and connectivity signaling.

use std::collections::HashMap;

use crate::chunk::{check_clock_reference, concat_audio_chunks, AudioChunk, CompressedAudioChunk, WireChunk};
use crate::clock::{ClockInterval, ClockReference};
use crate::codec_worker::{CodecWorkerChannel, DecoderRequestPayload, DecoderResponsePayload, EncoderRequestPayload, EncoderResponsePayload};
use crate::constants::{DEFAULT_CODEC_RATE, OPUS_FRAME_MS};
use crate::decoder::DecoderOutput;
use crate::encoder::EncoderOutput;
use crate::error::{CoreError, CoreResult};
use crate::framing::unpack_multi;
use crate::player::{ClientEvent, PlayerToContextMessage};
use crate::session::{PlayerSink, SessionContext};

/// Request/response contract with the server (spec §6.5): a binary body
/// (the packed multi-packet blob) plus a metadata side-channel.
#[derive(Debug, Clone)]
pub struct ServerRequest {
    pub body: Vec<u8>,
    pub metadata: HashMap<String, String>,
    pub epoch: u64,
}

#[derive(Debug, Clone)]
pub struct ServerResponse {
    pub metadata: HashMap<String, String>,
    pub chunk: Option<Vec<u8>>,
    pub epoch: u64,
}

/// Host-owned seam for the actual HTTP/WebSocket transport (out of scope
/// per §1), analogous to `walkie_talkie_engine`'s `PacketTransport`.
/// `None` signals an absent response — network failure, not "no data yet".
pub trait ServerTransport {
    fn send(&self, request: ServerRequest) -> Option<ServerResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingerState {
    Constructed,
    Starting,
    Running,
    LostConnectivity,
    Stopped,
}

pub struct SingerClient<T> {
    state: SingerState,
    mic_buf: Vec<AudioChunk>,
    mic_buf_len: i64,
    pending_metadata: HashMap<String, String>,
    username: String,
    userid: String,
    /// Running server-clock position this client has assigned to decoded
    /// response chunks so far; the wire format carries no explicit start
    /// (spec §6.5), so the client tracks it by construction (see DESIGN.md).
    next_server_clock: i64,
    transport: T,
}

impl<T: ServerTransport> SingerClient<T> {
    pub fn new(username: String, userid: String, transport: T) -> Self {
        Self {
            state: SingerState::Constructed,
            mic_buf: Vec::new(),
            mic_buf_len: 0,
            pending_metadata: HashMap::new(),
            username,
            userid,
            next_server_clock: 0,
            transport,
        }
    }

    pub fn state(&self) -> SingerState {
        self.state
    }

    pub fn start_singing(&mut self) {
        self.state = SingerState::Starting;
        // Discard events declared before start (spec §9 Open Question,
        // resolved in favor of the simpler of the two named options).
        self.pending_metadata.clear();
        self.state = SingerState::Running;
    }

    pub fn stop(&mut self) {
        self.state = SingerState::Stopped;
    }

    /// Accumulates event annotations to send with the next outbound batch.
    /// Discarded (not queued) before `start_singing` has run.
    pub fn declare_event(&mut self, key: String, value: String) {
        if self.state == SingerState::Running {
            self.pending_metadata.insert(key, value);
        }
    }

    pub fn on_player_message<WE, WD, P>(
        &mut self,
        session: &mut SessionContext<WE, WD, P>,
        message: PlayerToContextMessage,
    ) -> CoreResult<Vec<ClientEvent>>
    where
        WE: CodecWorkerChannel<Request = EncoderRequestPayload, Response = EncoderResponsePayload>,
        WD: CodecWorkerChannel<Request = DecoderRequestPayload, Response = DecoderResponsePayload>,
        P: PlayerSink,
    {
        match message {
            PlayerToContextMessage::SamplesOut { chunk } => self.on_samples_out(session, chunk),
            PlayerToContextMessage::Underflow => Err(CoreError::PlayerUnderflow),
            PlayerToContextMessage::Exception { exception } => Err(CoreError::CodecException { exception }),
            other => Err(CoreError::UnknownMessage {
                message_type: format!("{other:?}"),
            }),
        }
    }

    fn on_samples_out<WE, WD, P>(
        &mut self,
        session: &mut SessionContext<WE, WD, P>,
        chunk: WireChunk,
    ) -> CoreResult<Vec<ClientEvent>>
    where
        WE: CodecWorkerChannel<Request = EncoderRequestPayload, Response = EncoderResponsePayload>,
        WD: CodecWorkerChannel<Request = DecoderRequestPayload, Response = DecoderResponsePayload>,
        P: PlayerSink,
    {
        let input = chunk.into_encoder_input()?;
        match input {
            crate::chunk::EncoderInput::Audio(audio) => {
                check_clock_reference(&audio.interval, &ClockReference::Client(session.config().sampling_rate))?;
                self.mic_buf_len += audio.interval.length;
                self.mic_buf.push(audio);
            }
            crate::chunk::EncoderInput::Placeholder(_) => {
                return Err(CoreError::ClockStartedPlaceholder);
            }
        }

        if self.mic_buf_len >= session.sample_batch_size() {
            self.flush_batch(session)
        } else {
            Ok(vec![])
        }
    }

    fn flush_batch<WE, WD, P>(&mut self, session: &mut SessionContext<WE, WD, P>) -> CoreResult<Vec<ClientEvent>>
    where
        WE: CodecWorkerChannel<Request = EncoderRequestPayload, Response = EncoderResponsePayload>,
        WD: CodecWorkerChannel<Request = DecoderRequestPayload, Response = DecoderResponsePayload>,
        P: PlayerSink,
    {
        let drained = std::mem::take(&mut self.mic_buf);
        self.mic_buf_len = 0;
        let merged = concat_audio_chunks(&drained)?;

        let encoded = session
            .encoder_mut()?
            .encode_chunk(crate::chunk::EncoderInput::Audio(merged))?;
        let compressed = match encoded {
            EncoderOutput::Compressed(c) => c,
            EncoderOutput::Placeholder(_) => return Err(CoreError::ClockStartedPlaceholder),
        };

        let mut metadata = std::mem::take(&mut self.pending_metadata);
        metadata.insert("username".to_string(), self.username.clone());
        metadata.insert("userid".to_string(), self.userid.clone());

        let request = ServerRequest {
            body: compressed.data,
            metadata,
            epoch: session.epoch(),
        };

        match self.transport.send(request) {
            None => {
                self.state = SingerState::LostConnectivity;
                Ok(vec![ClientEvent::ConnectivityChange {
                    has_connectivity: false,
                }])
            }
            Some(response) => self.handle_response(session, response),
        }
    }

    fn handle_response<WE, WD, P>(
        &mut self,
        session: &mut SessionContext<WE, WD, P>,
        response: ServerResponse,
    ) -> CoreResult<Vec<ClientEvent>>
    where
        WE: CodecWorkerChannel<Request = EncoderRequestPayload, Response = EncoderResponsePayload>,
        WD: CodecWorkerChannel<Request = DecoderRequestPayload, Response = DecoderResponsePayload>,
        P: PlayerSink,
    {
        if response.epoch != session.epoch() {
            log::debug!(
                "discarding server response tagged with stale epoch {} (current {})",
                response.epoch,
                session.epoch()
            );
            return Ok(vec![]);
        }

        let Some(bytes) = response.chunk else {
            // Present response, absent chunk: normal, server had nothing yet.
            return Ok(vec![]);
        };

        let packet_count = unpack_multi(&bytes)?.len() as i64;
        let opus_samples = (OPUS_FRAME_MS as i64) * DEFAULT_CODEC_RATE / 1000;
        let expected_length = packet_count * opus_samples;
        let end = self.next_server_clock + expected_length;
        let interval = ClockInterval::new(ClockReference::Server(DEFAULT_CODEC_RATE), end, expected_length);
        self.next_server_clock = end;

        let compressed = CompressedAudioChunk::new(interval, bytes);
        let decoded = session
            .decoder_mut()?
            .decode_chunk(crate::chunk::DecoderInput::Compressed(compressed))?;

        match decoded {
            DecoderOutput::Audio(audio) => {
                session.push_samples_to_player(WireChunk::Audio(audio));
            }
            DecoderOutput::Placeholder(_) => {}
        }

        Ok(vec![])
    }
}
