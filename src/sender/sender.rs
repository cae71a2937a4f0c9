//! Outbound send state machine.
//!
//! One [`Sender`] exists per connection. It dispatches immediately while
//! idle, queues submissions while an asynchronous compression or payload
//! read is outstanding, and preserves strict submission order on drain.
//! Exactly one asynchronous operation is in flight at a time.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::extensions::{Compressor, Extensions, PERMESSAGE_DEFLATE};
use crate::protocol::frame::MAX_CONTROL_FRAME_PAYLOAD;
use crate::protocol::mask::MaskKeySource;
use crate::protocol::validation::is_valid_close_code;
use crate::protocol::{EncodedFrame, FrameData, FrameOptions, OpCode, frame};
use crate::sender::payload::{Payload, PayloadSource};
use crate::sender::transport::Transport;

/// Maximum close reason length: a 2-byte status code plus the reason must
/// fit in a control frame payload.
const MAX_CLOSE_REASON: usize = MAX_CONTROL_FRAME_PAYLOAD - 2;

/// Completion callback for one submitted operation. Invoked exactly once,
/// outside the sender's lock, with `Ok(())` once the frame has been handed
/// to the transport or with the error that cancelled the operation.
pub type SendCallback = Box<dyn FnOnce(Result<()>) + Send>;

/// Options for [`Sender::send`].
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    /// Send with the binary opcode instead of text.
    pub binary: bool,
    /// Ask for per-message compression (honored only when negotiated, and
    /// only decided on the first fragment of a message).
    pub compress: bool,
    /// This fragment is the last of its message.
    pub fin: bool,
    /// Mask the frame (client role).
    pub mask: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            binary: false,
            compress: false,
            fin: true,
            mask: false,
        }
    }
}

/// Sender activity state. At most one asynchronous operation is
/// outstanding; everything submitted meanwhile is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Ready to dispatch immediately.
    Idle,
    /// An asynchronous compression call is outstanding.
    Compressing,
    /// An asynchronous payload read is outstanding.
    ReadingPayload,
}

/// Per-frame layout decisions, fixed at submission time.
#[derive(Debug, Clone, Copy)]
struct FrameParams {
    /// Payload size used for backpressure accounting.
    byte_length: usize,
    fin: bool,
    opcode: OpCode,
    mask: bool,
    rsv1: bool,
}

/// A deferred operation waiting for the sender to become idle.
enum QueuedOp {
    /// Frame and write (compressing first when `compress` is set).
    Dispatch {
        data: FrameData,
        compress: bool,
        params: FrameParams,
        cb: Option<SendCallback>,
    },
    /// Materialize an asynchronous payload, then dispatch.
    Materialize {
        source: Box<dyn PayloadSource>,
        compress: bool,
        params: FrameParams,
        cb: Option<SendCallback>,
    },
}

impl QueuedOp {
    fn byte_length(&self) -> usize {
        match self {
            QueuedOp::Dispatch { params, .. } | QueuedOp::Materialize { params, .. } => {
                params.byte_length
            }
        }
    }

    fn into_callback(self) -> Option<SendCallback> {
        match self {
            QueuedOp::Dispatch { cb, .. } | QueuedOp::Materialize { cb, .. } => cb,
        }
    }
}

/// An asynchronous collaborator invocation, started after the sender's
/// lock is released.
enum AsyncOp {
    Compress {
        compressor: Arc<dyn Compressor>,
        data: Vec<u8>,
        params: FrameParams,
        cb: Option<SendCallback>,
    },
    Read {
        source: Box<dyn PayloadSource>,
        compress: bool,
        params: FrameParams,
        cb: Option<SendCallback>,
    },
}

/// Work collected under the lock and performed after it is released:
/// callbacks always fire outside the lock so they may re-enter the sender.
#[derive(Default)]
struct Effects {
    callbacks: Vec<(SendCallback, Result<()>)>,
    op: Option<AsyncOp>,
}

impl Effects {
    fn complete(&mut self, cb: Option<SendCallback>, result: Result<()>) {
        if let Some(cb) = cb {
            self.callbacks.push((cb, result));
        }
    }
}

struct Core {
    transport: Box<dyn Transport>,
    extensions: Extensions,
    keys: MaskKeySource,
    first_fragment: bool,
    compress_message: bool,
    buffered_bytes: usize,
    queue: VecDeque<QueuedOp>,
    state: SenderState,
    /// Latched once the cancel-everything path has run; the sender never
    /// returns to `Idle` afterwards.
    failed: bool,
}

impl Core {
    fn submit_data(
        &mut self,
        data: FrameData,
        compress: bool,
        params: FrameParams,
        cb: Option<SendCallback>,
        fx: &mut Effects,
    ) {
        if self.failed {
            fx.complete(cb, Err(Error::SocketClosed));
            return;
        }
        if self.state != SenderState::Idle {
            self.buffered_bytes += params.byte_length;
            self.queue.push_back(QueuedOp::Dispatch {
                data,
                compress,
                params,
                cb,
            });
            return;
        }
        self.dispatch(data, compress, params, cb, fx);
    }

    fn submit_source(
        &mut self,
        source: Box<dyn PayloadSource>,
        compress: bool,
        params: FrameParams,
        cb: Option<SendCallback>,
        fx: &mut Effects,
    ) {
        if self.failed {
            fx.complete(cb, Err(Error::SocketClosed));
            return;
        }
        if self.state != SenderState::Idle {
            self.buffered_bytes += params.byte_length;
            self.queue.push_back(QueuedOp::Materialize {
                source,
                compress,
                params,
                cb,
            });
            return;
        }
        self.start_read(source, compress, params, cb, fx);
    }

    fn dispatch(
        &mut self,
        data: FrameData,
        compress: bool,
        params: FrameParams,
        cb: Option<SendCallback>,
        fx: &mut Effects,
    ) {
        let compressor = if compress {
            self.extensions.get(PERMESSAGE_DEFLATE)
        } else {
            None
        };

        let Some(compressor) = compressor else {
            self.write_frame(data, params);
            fx.complete(cb, Ok(()));
            return;
        };

        self.buffered_bytes += params.byte_length;
        self.state = SenderState::Compressing;
        fx.op = Some(AsyncOp::Compress {
            compressor,
            data: data.into_vec(),
            params,
            cb,
        });
    }

    fn start_read(
        &mut self,
        source: Box<dyn PayloadSource>,
        compress: bool,
        params: FrameParams,
        cb: Option<SendCallback>,
        fx: &mut Effects,
    ) {
        self.buffered_bytes += params.byte_length;
        self.state = SenderState::ReadingPayload;
        fx.op = Some(AsyncOp::Read {
            source,
            compress,
            params,
            cb,
        });
    }

    /// Drain queued operations in FIFO order until the queue empties or an
    /// asynchronous operation takes over.
    fn dequeue(&mut self, fx: &mut Effects) {
        while self.state == SenderState::Idle && !self.failed {
            let Some(op) = self.queue.pop_front() else {
                break;
            };
            self.buffered_bytes -= op.byte_length();
            match op {
                QueuedOp::Dispatch {
                    data,
                    compress,
                    params,
                    cb,
                } => self.dispatch(data, compress, params, cb, fx),
                QueuedOp::Materialize {
                    source,
                    compress,
                    params,
                    cb,
                } => self.start_read(source, compress, params, cb, fx),
            }
        }
    }

    /// Serialize and write one frame. Header and payload of a split frame
    /// go out back-to-back inside a cork/uncork pair.
    fn write_frame(&mut self, data: FrameData, params: FrameParams) {
        let mask = if params.mask { Some(&mut self.keys) } else { None };
        let encoded = frame(
            data,
            FrameOptions {
                fin: params.fin,
                rsv1: params.rsv1,
                opcode: params.opcode,
                mask,
            },
        );
        match encoded {
            EncodedFrame::Single(buf) => {
                self.transport.write(&buf);
            }
            EncodedFrame::Split { header, payload } => {
                self.transport.cork();
                self.transport.write(&header);
                self.transport.write(&payload);
                self.transport.uncork();
            }
        }
    }

    /// Cancel-everything routine: fail the in-flight callback, then every
    /// queued callback with the same error, FIFO, and latch the failed
    /// state. Nothing further is sent on this connection.
    fn fail_all(&mut self, err: &Error, cb: Option<SendCallback>, fx: &mut Effects) {
        self.failed = true;
        self.buffered_bytes = 0;
        fx.complete(cb, Err(err.clone()));
        while let Some(op) = self.queue.pop_front() {
            fx.complete(op.into_callback(), Err(err.clone()));
        }
    }
}

/// Outbound half of one WebSocket connection.
///
/// Cheap to clone; clones share the same state machine. Completion
/// callbacks from collaborators may arrive on another thread.
pub struct Sender {
    core: Arc<Mutex<Core>>,
}

impl Clone for Sender {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.lock_core();
        f.debug_struct("Sender")
            .field("state", &core.state)
            .field("buffered_bytes", &core.buffered_bytes)
            .field("queued", &core.queue.len())
            .field("failed", &core.failed)
            .finish()
    }
}

impl Sender {
    /// Create a sender over `transport` with the connection's negotiated
    /// extensions and mask-key source.
    #[must_use]
    pub fn new(
        transport: Box<dyn Transport>,
        extensions: Extensions,
        keys: MaskKeySource,
    ) -> Self {
        Self {
            core: Arc::new(Mutex::new(Core {
                transport,
                extensions,
                keys,
                first_fragment: true,
                compress_message: false,
                buffered_bytes: 0,
                queue: VecDeque::new(),
                state: SenderState::Idle,
                failed: false,
            })),
        }
    }

    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bytes queued or in flight but not yet handed to the transport.
    ///
    /// The caller-visible backpressure signal: exactly 0 when idle with an
    /// empty queue.
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        self.lock_core().buffered_bytes
    }

    /// Current activity state.
    #[must_use]
    pub fn state(&self) -> SenderState {
        self.lock_core().state
    }

    /// Send a data message (or one fragment of one).
    ///
    /// The first fragment carries the text/binary opcode and, when
    /// compression applies, the RSV1 bit; later fragments are forced to
    /// continuation/uncompressed. `fin` resets fragment tracking for the
    /// next message. Compression of a message whose negotiated extension
    /// disables context takeover for this role is skipped below the
    /// extension's size threshold.
    pub fn send(
        &self,
        payload: impl Into<Payload>,
        options: SendOptions,
        cb: Option<SendCallback>,
    ) {
        let payload = payload.into();
        let mut fx = Effects::default();
        {
            let mut core = self.lock_core();
            let compressor = core.extensions.get(PERMESSAGE_DEFLATE);
            let byte_length = payload.byte_length();

            let mut opcode = if options.binary {
                OpCode::Binary
            } else {
                OpCode::Text
            };
            let mut rsv1 = options.compress && compressor.is_some();

            if core.first_fragment {
                core.first_fragment = false;
                if rsv1 {
                    if let Some(compressor) = &compressor {
                        if compressor.no_context_takeover() {
                            rsv1 = byte_length >= compressor.threshold();
                        }
                    }
                }
                core.compress_message = rsv1;
            } else {
                rsv1 = false;
                opcode = OpCode::Continuation;
            }

            if options.fin {
                core.first_fragment = true;
            }

            let compress = core.compress_message;
            let params = FrameParams {
                byte_length,
                fin: options.fin,
                opcode,
                mask: options.mask,
                rsv1,
            };

            match payload {
                Payload::Text(text) => {
                    let data = FrameData::Owned(text.into_bytes());
                    core.submit_data(data, compress, params, cb, &mut fx);
                }
                Payload::Binary(data) => {
                    core.submit_data(FrameData::Owned(data), compress, params, cb, &mut fx);
                }
                Payload::Shared(data) => {
                    core.submit_data(FrameData::ReadOnly(data), compress, params, cb, &mut fx);
                }
                Payload::Source(source) => {
                    core.submit_source(source, compress, params, cb, &mut fx);
                }
            }
        }
        self.run(fx);
    }

    /// Send a close frame.
    ///
    /// With a status code, the code is validated and the reason must fit in
    /// 123 bytes; without one, the close frame is empty and the reason is
    /// ignored. Violations fail synchronously and nothing is sent.
    pub fn close(
        &self,
        code: Option<u16>,
        reason: &str,
        mask: bool,
        cb: Option<SendCallback>,
    ) -> Result<()> {
        let payload = match code {
            None => Vec::new(),
            Some(code) => {
                if !is_valid_close_code(code) {
                    return Err(Error::InvalidCloseCode(code));
                }
                if reason.len() > MAX_CLOSE_REASON {
                    return Err(Error::CloseReasonTooLarge(reason.len()));
                }
                let mut buf = Vec::with_capacity(2 + reason.len());
                buf.extend_from_slice(&code.to_be_bytes());
                buf.extend_from_slice(reason.as_bytes());
                buf
            }
        };
        self.send_control(OpCode::Close, payload, mask, cb);
        Ok(())
    }

    /// Send a ping frame. The payload must fit in 125 bytes.
    pub fn ping(
        &self,
        data: impl Into<Vec<u8>>,
        mask: bool,
        cb: Option<SendCallback>,
    ) -> Result<()> {
        self.control_with_payload(OpCode::Ping, data.into(), mask, cb)
    }

    /// Send a pong frame. The payload must fit in 125 bytes.
    pub fn pong(
        &self,
        data: impl Into<Vec<u8>>,
        mask: bool,
        cb: Option<SendCallback>,
    ) -> Result<()> {
        self.control_with_payload(OpCode::Pong, data.into(), mask, cb)
    }

    fn control_with_payload(
        &self,
        opcode: OpCode,
        data: Vec<u8>,
        mask: bool,
        cb: Option<SendCallback>,
    ) -> Result<()> {
        if data.len() > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::ControlFrameTooLarge(data.len()));
        }
        self.send_control(opcode, data, mask, cb);
        Ok(())
    }

    /// Control frames are single-fragment and never compressed.
    fn send_control(&self, opcode: OpCode, data: Vec<u8>, mask: bool, cb: Option<SendCallback>) {
        let params = FrameParams {
            byte_length: data.len(),
            fin: true,
            opcode,
            mask,
            rsv1: false,
        };
        let mut fx = Effects::default();
        {
            let mut core = self.lock_core();
            core.submit_data(FrameData::Owned(data), false, params, cb, &mut fx);
        }
        self.run(fx);
    }

    /// Perform work collected under the lock: deliver callbacks, then start
    /// at most one collaborator invocation.
    fn run(&self, fx: Effects) {
        for (cb, result) in fx.callbacks {
            cb(result);
        }
        match fx.op {
            None => {}
            Some(AsyncOp::Compress {
                compressor,
                data,
                params,
                cb,
            }) => {
                let sender = self.clone();
                compressor.compress(
                    data,
                    params.fin,
                    Box::new(move |result| sender.on_compress_done(params, cb, result)),
                );
            }
            Some(AsyncOp::Read {
                source,
                compress,
                params,
                cb,
            }) => {
                let sender = self.clone();
                source.read(Box::new(move |result| {
                    sender.on_read_done(compress, params, cb, result);
                }));
            }
        }
    }

    fn on_compress_done(
        &self,
        params: FrameParams,
        cb: Option<SendCallback>,
        result: Result<Vec<u8>>,
    ) {
        let mut fx = Effects::default();
        {
            let mut core = self.lock_core();
            if core.failed {
                fx.complete(cb, Err(Error::SocketClosed));
            } else if core.transport.is_destroyed() {
                core.fail_all(&Error::SocketClosed, cb, &mut fx);
            } else {
                match result {
                    Err(err) => core.fail_all(&err, cb, &mut fx),
                    Ok(compressed) => {
                        core.buffered_bytes -= params.byte_length;
                        core.state = SenderState::Idle;
                        // The compressed buffer is fresh and owned, so it
                        // masks in place regardless of the original payload.
                        core.write_frame(FrameData::Owned(compressed), params);
                        fx.complete(cb, Ok(()));
                        core.dequeue(&mut fx);
                    }
                }
            }
        }
        self.run(fx);
    }

    fn on_read_done(
        &self,
        compress: bool,
        params: FrameParams,
        cb: Option<SendCallback>,
        result: Result<Vec<u8>>,
    ) {
        let mut fx = Effects::default();
        {
            let mut core = self.lock_core();
            if core.failed {
                fx.complete(cb, Err(Error::SocketClosed));
            } else if core.transport.is_destroyed() {
                core.fail_all(&Error::SocketClosed, cb, &mut fx);
            } else {
                match result {
                    Err(err) => core.fail_all(&err, cb, &mut fx),
                    Ok(data) => {
                        core.buffered_bytes -= params.byte_length;
                        core.state = SenderState::Idle;
                        if compress {
                            core.dispatch(FrameData::Owned(data), true, params, cb, &mut fx);
                        } else {
                            core.write_frame(FrameData::Owned(data), params);
                            fx.complete(cb, Ok(()));
                            core.dequeue(&mut fx);
                        }
                    }
                }
            }
        }
        self.run(fx);
    }
}
