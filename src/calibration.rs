//! Calibration clients (spec §4.8): alternate consumers of the player-node
//! message stream that substitute themselves in place of the singer client
//! for the duration of a calibration pass.

use crate::constants::{CALIBRATION_SAMPLE_MINIMUM, CALIBRATION_SUCCESS_WINDOW_MS};
use crate::error::{CoreError, CoreResult};
use crate::player::{ClientEvent, ConsumerOutcome, ContextToPlayerMessage, PlayerMessageConsumer, PlayerToContextMessage};

/// Natural log base used to convert linear RMS volume into the
/// human-readable scale the UI expects (spec §4.8): `ln(volume·1000)/6.908`.
const VOLUME_LOG_SCALE: f64 = 6.908;

/// Enables `volume_estimation_mode` and relays RMS readback as a
/// human-readable scale; terminates on the input-gain report.
pub struct VolumeCalibrator {
    has_mic_input: bool,
}

impl VolumeCalibrator {
    pub fn new() -> Self {
        Self { has_mic_input: true }
    }

    /// Messages the session must post to the player when activating this mode.
    pub fn activation_messages() -> Vec<ContextToPlayerMessage> {
        vec![ContextToPlayerMessage::VolumeEstimationMode { enabled: true }]
    }
}

impl Default for VolumeCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerMessageConsumer for VolumeCalibrator {
    fn on_player_message(&mut self, message: &PlayerToContextMessage) -> CoreResult<ConsumerOutcome> {
        match message {
            PlayerToContextMessage::CurrentVolume { volume } => {
                let human_readable = ((*volume as f64) * 1000.0).ln() / VOLUME_LOG_SCALE;
                Ok(ConsumerOutcome::events(vec![ClientEvent::VolumeChange {
                    human_readable,
                }]))
            }
            PlayerToContextMessage::InputGain { input_gain } => Ok(ConsumerOutcome {
                events: vec![ClientEvent::VolumeCalibrated {
                    input_gain: *input_gain,
                }],
                post: vec![ContextToPlayerMessage::VolumeEstimationMode { enabled: false }],
                deactivate: true,
            }),
            PlayerToContextMessage::NoMicInput => {
                self.has_mic_input = !self.has_mic_input;
                Ok(ConsumerOutcome::events(vec![ClientEvent::MicInputChange {
                    has_mic_input: self.has_mic_input,
                }]))
            }
            other => Err(CoreError::UnknownMessage {
                message_type: format!("{other:?}"),
            }),
        }
    }
}

/// Enables `latency_estimation_mode` with a settable click volume; fires a
/// `beep` event per estimate and completes after observing enough samples
/// (spec §4.8, §8 property 8).
pub struct LatencyCalibrator {
    click_volume: f32,
    has_mic_input: bool,
    done_fired: bool,
}

impl LatencyCalibrator {
    pub fn new(click_volume: f32) -> Self {
        Self {
            click_volume,
            has_mic_input: true,
            done_fired: false,
        }
    }

    pub fn activation_messages(&self) -> Vec<ContextToPlayerMessage> {
        vec![
            ContextToPlayerMessage::LatencyEstimationMode { enabled: true },
            ContextToPlayerMessage::ClickVolumeChange {
                value: self.click_volume,
            },
        ]
    }

    pub fn has_finished(&self) -> bool {
        self.done_fired
    }
}

impl PlayerMessageConsumer for LatencyCalibrator {
    fn on_player_message(&mut self, message: &PlayerToContextMessage) -> CoreResult<ConsumerOutcome> {
        match message {
            PlayerToContextMessage::LatencyEstimate {
                samples,
                p25,
                p50,
                p75,
                jank,
            } => {
                if self.done_fired {
                    // Completion already reported once; spec requires `done`
                    // to fire exactly once, so later estimates are ignored.
                    return Ok(ConsumerOutcome::default());
                }

                let complete = *samples >= CALIBRATION_SAMPLE_MINIMUM;
                let success = match (p25, p75) {
                    (Some(p25), Some(p75)) => Some((*p75 - *p25) <= CALIBRATION_SUCCESS_WINDOW_MS),
                    _ => None,
                };
                let est25_to_75 = match (p25, p75) {
                    (Some(p25), Some(p75)) => Some(*p75 - *p25),
                    _ => None,
                };

                let mut outcome = ConsumerOutcome::events(vec![ClientEvent::Beep {
                    samples: *samples,
                    done: complete,
                    est_latency: *p50,
                    est25_to_75,
                    jank: *jank,
                    success,
                }]);

                if complete {
                    self.done_fired = true;
                    outcome.post.push(ContextToPlayerMessage::LatencyEstimationMode { enabled: false });
                    if success == Some(true) {
                        if let Some(local_latency) = p50 {
                            outcome
                                .post
                                .push(ContextToPlayerMessage::LocalLatency {
                                    local_latency: local_latency.round() as i32,
                                });
                        }
                    }
                    outcome.deactivate = true;
                }

                Ok(outcome)
            }
            PlayerToContextMessage::NoMicInput => {
                self.has_mic_input = !self.has_mic_input;
                Ok(ConsumerOutcome::events(vec![ClientEvent::MicInputChange {
                    has_mic_input: self.has_mic_input,
                }]))
            }
            other => Err(CoreError::UnknownMessage {
                message_type: format!("{other:?}"),
            }),
        }
    }
}
