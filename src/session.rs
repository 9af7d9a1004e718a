//! Session context (spec §4.6): owns the audio-graph endpoints and the codec
//! worker instances, and is the single site allowed to post configuration
//! messages to the player node.

use crate::chunk::WireChunk;
use crate::codec_worker::{CodecWorkerChannel, DecoderRequestPayload, DecoderResponsePayload, EncoderRequestPayload, EncoderResponsePayload};
use crate::constants::{INITIAL_MS_PER_BATCH, OPUS_LATENCY_MS, RESAMPLER_LATENCY_MS, WORKLET_FRAME_SAMPLES};
use crate::decoder::DecoderPipeline;
use crate::encoder::EncoderPipeline;
use crate::error::CoreResult;
use crate::player::{ContextToPlayerMessage, PlayerMessageBus, PlayerMessageConsumer, PlayerToContextMessage, ClientEvent};

/// Host-provided sink the context posts player-node configuration messages
/// to, analogous to `walkie_talkie_engine`'s `PacketTransport` callback trait.
pub trait PlayerSink {
    fn post(&self, message: ContextToPlayerMessage);
}

/// Plain configuration record, constructed programmatically by the host
/// (see `SPEC_FULL.md` §4.6 — no external config-file format is introduced).
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub sampling_rate: i64,
    pub initial_ms_per_batch: u32,
    pub max_ms_per_batch: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 48_000,
            initial_ms_per_batch: INITIAL_MS_PER_BATCH,
            max_ms_per_batch: crate::constants::MAX_MS_PER_BATCH,
        }
    }
}

pub struct SessionContext<WE, WD, P> {
    config: SessionConfig,
    player: P,
    make_encoder_worker: Box<dyn Fn() -> WE>,
    make_decoder_worker: Box<dyn Fn() -> WD>,
    encoder: Option<EncoderPipeline<WE>>,
    decoder: Option<DecoderPipeline<WD>>,
    encoder_resampling: bool,
    decoder_resampling: bool,
    epoch: u64,
    synthetic_source: bool,
    message_bus: PlayerMessageBus,
}

impl<WE, WD, P> SessionContext<WE, WD, P>
where
    WE: CodecWorkerChannel<Request = EncoderRequestPayload, Response = EncoderResponsePayload>,
    WD: CodecWorkerChannel<Request = DecoderRequestPayload, Response = DecoderResponsePayload>,
    P: PlayerSink,
{
    pub fn new(
        config: SessionConfig,
        player: P,
        make_encoder_worker: impl Fn() -> WE + 'static,
        make_decoder_worker: impl Fn() -> WD + 'static,
    ) -> Self {
        Self {
            config,
            player,
            make_encoder_worker: Box::new(make_encoder_worker),
            make_decoder_worker: Box::new(make_decoder_worker),
            encoder: None,
            decoder: None,
            encoder_resampling: false,
            decoder_resampling: false,
            epoch: 0,
            synthetic_source: false,
            message_bus: PlayerMessageBus::new(),
        }
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn set_synthetic_source(&mut self, enabled: bool) {
        self.synthetic_source = enabled;
    }

    pub fn set_active_consumer(&mut self, consumer: Box<dyn PlayerMessageConsumer>) {
        self.message_bus.set_active(consumer);
    }

    /// Routes a player-node message to the currently active substituted
    /// consumer (a calibrator), executing any effect it asks for — posting
    /// a message to the player and/or deactivating itself.
    pub fn dispatch_player_message(&mut self, message: PlayerToContextMessage) -> CoreResult<Vec<ClientEvent>> {
        let outcome = self.message_bus.dispatch(message)?;
        for post in outcome.post {
            self.post_to_player(post);
        }
        Ok(outcome.events)
    }

    pub(crate) fn post_to_player(&self, message: ContextToPlayerMessage) {
        self.player.post(message);
    }

    /// Pushes a decoded chunk to the player node for playback (spec §4.7:
    /// "a present response with a chunk is decoded and pushed to the player
    /// node via the context").
    pub fn push_samples_to_player(&self, chunk: WireChunk) {
        self.post_to_player(ContextToPlayerMessage::SamplesIn { chunk });
    }

    /// Number of samples the singer client must accumulate before one
    /// encode/send cycle, derived from the pacing target (spec §4.6).
    pub fn sample_batch_size(&self) -> i64 {
        let samples_per_ms = self.config.sampling_rate as f64 / 1000.0;
        let frames =
            (samples_per_ms * self.config.initial_ms_per_batch as f64 / WORKLET_FRAME_SAMPLES as f64).round() as i64;
        frames * WORKLET_FRAME_SAMPLES as i64
    }

    /// Lazily creates and sets up both pipelines on first use; the codec
    /// workers are expensive to allocate so this never recurs across resets.
    fn ensure_pipelines(&mut self) -> CoreResult<()> {
        if self.encoder.is_none() {
            let mut encoder = EncoderPipeline::new((self.make_encoder_worker)());
            self.encoder_resampling = encoder.setup(self.config.sampling_rate)?;
            self.encoder = Some(encoder);
        }
        if self.decoder.is_none() {
            let mut decoder = DecoderPipeline::new((self.make_decoder_worker)());
            decoder.setup(self.config.sampling_rate)?;
            self.decoder = Some(decoder);
            // Decoder setup has no `resampling` field in its response (§6.1);
            // the session only needs the encoder's, per `encoding_latency_ms`.
            self.decoder_resampling = false;
        }
        Ok(())
    }

    pub fn encoder_mut(&mut self) -> CoreResult<&mut EncoderPipeline<WE>> {
        self.ensure_pipelines()?;
        Ok(self.encoder.as_mut().expect("just ensured"))
    }

    pub fn decoder_mut(&mut self) -> CoreResult<&mut DecoderPipeline<WD>> {
        self.ensure_pipelines()?;
        Ok(self.decoder.as_mut().expect("just ensured"))
    }

    /// The atomic restart point (spec §4.6): stop the player, reset both
    /// pipelines, bump the epoch, then push fresh audio params.
    pub fn reload_settings(&mut self, _startup: bool) -> CoreResult<()> {
        self.post_to_player(ContextToPlayerMessage::Stop);
        self.ensure_pipelines()?;
        if let Some(encoder) = &mut self.encoder {
            encoder.reset();
        }
        if let Some(decoder) = &mut self.decoder {
            decoder.reset();
        }
        self.epoch = self.epoch.wrapping_add(1);
        self.post_to_player(ContextToPlayerMessage::AudioParams {
            synthetic_source: self.synthetic_source,
            click_interval: None,
            loopback_mode: false,
            epoch: self.epoch,
        });
        log::info!("session reload complete, epoch {}", self.epoch);
        Ok(())
    }

    pub fn start(&mut self) -> CoreResult<()> {
        log::info!("starting session");
        self.reload_settings(true)
    }

    /// Latency compensation figure reported back to the player (spec §4.6).
    pub fn encoding_latency_ms(&self) -> f64 {
        if self.synthetic_source {
            return 0.0;
        }
        let mut total = OPUS_LATENCY_MS;
        if self.encoder_resampling {
            total += RESAMPLER_LATENCY_MS;
        }
        if self.decoder_resampling {
            total += RESAMPLER_LATENCY_MS;
        }
        total
    }
}
