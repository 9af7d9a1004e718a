//! Player-node message types (spec §6.3, §6.4) and the publish/subscribe
//! dispatcher that replaces the source's handler-rebinding (spec §9,
//! "Invasive coupling → publish/subscribe").

use crate::chunk::WireChunk;
use crate::error::{CoreError, CoreResult};

/// Messages the session context posts to the player node (spec §6.3).
#[derive(Debug, Clone)]
pub enum ContextToPlayerMessage {
    Stop,
    AudioParams {
        synthetic_source: bool,
        click_interval: Option<u32>,
        loopback_mode: bool,
        epoch: u64,
    },
    SamplesIn {
        chunk: WireChunk,
    },
    LatencyEstimationMode {
        enabled: bool,
    },
    VolumeEstimationMode {
        enabled: bool,
    },
    IgnoreInput {
        enabled: bool,
    },
    ClickVolumeChange {
        value: f32,
    },
    LocalLatency {
        local_latency: i32,
    },
    RequestCurClock,
    SetAlarm {
        time: i64,
    },
}

/// Messages the player node posts back to the session context (spec §6.4).
#[derive(Debug, Clone)]
pub enum PlayerToContextMessage {
    SamplesOut {
        chunk: WireChunk,
    },
    Underflow,
    NoMicInput,
    CurrentVolume {
        volume: f32,
    },
    InputGain {
        input_gain: f32,
    },
    LatencyEstimate {
        samples: u32,
        p25: Option<f64>,
        p50: Option<f64>,
        p75: Option<f64>,
        jank: Option<f64>,
    },
    CurClock {
        clock: i64,
    },
    Alarm {
        time: i64,
    },
    Exception {
        exception: String,
    },
}

/// User-visible, named events emitted by the singer client and calibrators
/// (spec §4.7, §4.8). These are the terminal output of the core: the host
/// application surfaces them to its UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    ConnectivityChange { has_connectivity: bool },
    VolumeChange { human_readable: f64 },
    VolumeCalibrated { input_gain: f32 },
    MicInputChange { has_mic_input: bool },
    Beep {
        samples: u32,
        done: bool,
        est_latency: Option<f64>,
        est25_to_75: Option<f64>,
        jank: Option<f64>,
        success: Option<bool>,
    },
}

/// What a [`PlayerMessageConsumer`] wants to happen as a result of handling
/// one message. Consumers never talk to the player node directly (only the
/// session context is allowed to post to it, per spec §5); `post` names the
/// message the context should send on the consumer's behalf, and
/// `deactivate` tells the bus to drop this consumer afterward.
#[derive(Debug, Clone, Default)]
pub struct ConsumerOutcome {
    pub events: Vec<ClientEvent>,
    pub post: Vec<ContextToPlayerMessage>,
    pub deactivate: bool,
}

impl ConsumerOutcome {
    pub fn events(events: Vec<ClientEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }
}

/// A runtime mode that substitutes itself as the player-node message
/// handler: the volume calibrator or the latency calibrator (spec §4.8,
/// "Both... substitute themselves as the player-node message handler"). The
/// singer client is the default handler and is driven directly by the
/// session owner rather than through this bus (see `singer.rs`).
pub trait PlayerMessageConsumer {
    fn on_player_message(&mut self, message: &PlayerToContextMessage) -> CoreResult<ConsumerOutcome>;
}

/// Routes inbound player-node messages to whichever consumer is currently
/// active. `exception` and `underflow` are always fatal regardless of mode
/// and are handled before reaching the active consumer (spec §4.7, "Inbound
/// event loop").
#[derive(Default)]
pub struct PlayerMessageBus {
    active: Option<Box<dyn PlayerMessageConsumer>>,
}

impl PlayerMessageBus {
    pub fn new() -> Self {
        Self { active: None }
    }

    pub fn set_active(&mut self, consumer: Box<dyn PlayerMessageConsumer>) {
        self.active = Some(consumer);
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn has_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn dispatch(&mut self, message: PlayerToContextMessage) -> CoreResult<ConsumerOutcome> {
        match &message {
            PlayerToContextMessage::Exception { exception } => {
                return Err(CoreError::CodecException {
                    exception: exception.clone(),
                })
            }
            PlayerToContextMessage::Underflow => return Err(CoreError::PlayerUnderflow),
            _ => {}
        }

        match &mut self.active {
            Some(consumer) => {
                let outcome = consumer.on_player_message(&message)?;
                if outcome.deactivate {
                    self.active = None;
                }
                Ok(outcome)
            }
            None => Err(CoreError::UnknownMessage {
                message_type: format!("{message:?}"),
            }),
        }
    }
}
