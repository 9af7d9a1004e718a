//! The external codec-worker contract (spec §4.3, §6.1) and the channel
//! abstraction pipelines use to talk to it.
//!
//! A codec worker is an independent executor: requests go in, responses come
//! out in send order. This crate never implements the Opus encode/decode
//! itself (that's an external collaborator per spec §1) — it only defines
//! the message shapes and the ordering discipline around them.

use crate::error::{CoreError, CoreResult};
use std::collections::VecDeque;
use std::thread;

/// A request to a codec worker, tagged with a monotonically increasing id
/// (unique per pipeline) used to detect out-of-order responses.
#[derive(Debug, Clone)]
pub struct WorkerRequest<P> {
    pub request_id: u32,
    pub payload: P,
}

/// A response from a codec worker. `Exception` carries no request id because
/// the source contract allows a worker to raise an exception outside the
/// normal request/response cycle (spec §4.3).
#[derive(Debug, Clone)]
pub enum WorkerResponse<P> {
    Success { request_id: u32, payload: P },
    Failure { request_id: u32, status: i32 },
    Exception { exception: String },
}

// --- Encoder worker payloads (spec §6.1) ---------------------------------

#[derive(Debug, Clone, Copy)]
pub struct EncoderSetupConfig {
    pub sampling_rate: i64,
    pub num_of_channels: u8,
    pub frame_duration: u32,
}

#[derive(Debug, Clone)]
pub enum EncoderRequestPayload {
    Setup(EncoderSetupConfig),
    Encode { samples: Vec<f32> },
    Reset,
}

#[derive(Debug, Clone)]
pub enum EncoderResponsePayload {
    Setup {
        resampling: bool,
    },
    Encode {
        packets: Vec<Vec<u8>>,
        samples_encoded: i64,
        buffered_samples: i64,
    },
    Reset,
}

// --- Decoder worker payloads (spec §6.1) ---------------------------------

#[derive(Debug, Clone, Copy)]
pub struct DecoderSetupConfig {
    pub sampling_rate: i64,
    pub num_of_channels: u8,
}

#[derive(Debug, Clone)]
pub enum DecoderRequestPayload {
    Setup(DecoderSetupConfig),
    Decode { data: Vec<u8> },
    Reset,
}

#[derive(Debug, Clone)]
pub enum DecoderResponsePayload {
    Setup,
    Decode { samples: Vec<f32> },
    Reset,
}

/// The channel a pipeline uses to talk to its codec worker. Implementations
/// may be a real background thread (see [`ThreadCodecWorker`]) or, in tests,
/// a deterministic in-memory double.
pub trait CodecWorkerChannel {
    type Request;
    type Response;

    fn send(&self, request: WorkerRequest<Self::Request>) -> CoreResult<()>;

    /// Blocks until the next response is available. The owner task treats
    /// this as its suspension/await point (spec §5).
    fn recv(&self) -> CoreResult<WorkerResponse<Self::Response>>;
}

/// FIFO tracker for in-flight request ids (spec §4.3, §5, §8 property 6).
#[derive(Debug, Default)]
pub struct PendingRequestQueue {
    ids: VecDeque<u32>,
    next_id: u32,
}

impl PendingRequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next request id and records it as in-flight.
    pub fn push(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.ids.push_back(id);
        id
    }

    /// Pops the front of the queue and verifies it matches `got`. A mismatch
    /// (or an empty queue) is a protocol violation (spec §4.3).
    pub fn check_and_pop(&mut self, got: u32) -> CoreResult<()> {
        match self.ids.pop_front() {
            Some(expected) if expected == got => Ok(()),
            Some(expected) => {
                // Put it back so the caller can see a consistent queue state.
                self.ids.push_front(expected);
                Err(CoreError::ResponseOutOfOrder { expected, got })
            }
            None => Err(CoreError::ResponseOutOfOrder {
                expected: got,
                got,
            }),
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

/// A codec worker backed by a dedicated OS thread, fed by an unbounded
/// channel — the concurrency shape `walkie_talkie_engine` uses for its
/// packet-transport forwarder and decode mixing loop.
pub struct ThreadCodecWorker<Req, Resp> {
    request_tx: crossbeam_channel::Sender<WorkerRequest<Req>>,
    response_rx: crossbeam_channel::Receiver<WorkerResponse<Resp>>,
    _handle: thread::JoinHandle<()>,
}

impl<Req, Resp> ThreadCodecWorker<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Spawns a worker thread that applies `process` to each inbound
    /// request in turn, in arrival order — the single-executor guarantee
    /// the spec's ordering invariants rely on.
    pub fn spawn<F>(mut process: F) -> Self
    where
        F: FnMut(WorkerRequest<Req>) -> WorkerResponse<Resp> + Send + 'static,
    {
        let (request_tx, request_rx) = crossbeam_channel::unbounded();
        let (response_tx, response_rx) = crossbeam_channel::unbounded();
        let handle = thread::spawn(move || {
            while let Ok(request) = request_rx.recv() {
                let response = process(request);
                if response_tx.send(response).is_err() {
                    break;
                }
            }
        });
        Self {
            request_tx,
            response_rx,
            _handle: handle,
        }
    }
}

impl<Req, Resp> CodecWorkerChannel for ThreadCodecWorker<Req, Resp> {
    type Request = Req;
    type Response = Resp;

    fn send(&self, request: WorkerRequest<Req>) -> CoreResult<()> {
        self.request_tx.send(request).map_err(|_| CoreError::CodecException {
            exception: "codec worker thread terminated".to_string(),
        })
    }

    fn recv(&self) -> CoreResult<WorkerResponse<Resp>> {
        self.response_rx.recv().map_err(|_| CoreError::CodecException {
            exception: "codec worker thread terminated".to_string(),
        })
    }
}
