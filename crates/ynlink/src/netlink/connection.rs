//! Request/reply exchange engine and the per-family operation registry.
//!
//! An exchange is one request datagram followed by a receive loop that runs
//! until the kernel signals completion: an explicit `DONE` frame for dumps,
//! or the first payload / pure ACK for `do` requests. A single `recvmsg`
//! may carry several concatenated frames, and a dump may span several
//! `recvmsg` calls; the loop handles both.
//!
//! Control frames fold into [`ControlOutcome`] so the state machine's
//! transitions are explicit match arms rather than error-driven control
//! flow. Frames whose `(seq, pid)` do not match the outstanding request are
//! unrelated notifications and are skipped.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use super::attr::Value;
use super::codec::{ByteOrder, Decoder, Encoder};
use super::envelope::{Message, MessageDef};
use super::error::{Error, Result};
use super::message::{
    NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, NLMSG_ALIGNTO, NLMSG_HDRLEN, NlMsgHdr, NlMsgType,
};
use super::socket::{NetlinkSocket, Transport};

/// Exchange mode: single-shot request or kernel-streamed dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// One request, at most one reply (or a pure ACK).
    Do,
    /// One request, a stream of replies terminated by `DONE`.
    Dump,
}

/// What a decoded control frame means to the exchange loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlOutcome {
    /// `ERROR` frame with errno 0.
    Ack,
    /// `ERROR` frame with a nonzero errno.
    Failure(i32),
    /// `DONE` frame.
    Done,
    /// `NOOP` or an unrecognized control type.
    Skip,
}

/// Decode a control frame's payload and classify it.
///
/// The cursor is left at the end of the frame's declared payload.
fn decode_control(dec: &mut Decoder<'_>, header: &NlMsgHdr) -> Result<ControlOutcome> {
    let payload_len = header.payload_len()?;
    match header.nlmsg_type {
        NlMsgType::ERROR => {
            if payload_len < 4 {
                return Err(Error::InvalidMessage("truncated error frame".into()));
            }
            let errno = dec.i32(ByteOrder::Host)?;
            // The rest is the echoed request header plus optional
            // extended-ACK attributes.
            dec.skip(payload_len - 4)?;
            if errno == 0 {
                Ok(ControlOutcome::Ack)
            } else {
                Ok(ControlOutcome::Failure(errno))
            }
        }
        NlMsgType::DONE => {
            dec.skip(payload_len)?;
            Ok(ControlOutcome::Done)
        }
        _ => {
            dec.skip(payload_len)?;
            Ok(ControlOutcome::Skip)
        }
    }
}

/// Run one exchange against a transport.
///
/// Builds the request from named arguments, stamps `(seq, pid)`, sends one
/// datagram, and receives until the exchange completes. Returns the decoded
/// payload messages in arrival order; a nonzero kernel errno aborts the
/// exchange with [`Error::Kernel`]. No retries happen at this layer.
pub async fn exchange<S: Transport>(
    socket: &S,
    kind: ExchangeKind,
    request_def: &MessageDef,
    reply_def: Option<&MessageDef>,
    args: &[(&str, Value)],
) -> Result<Vec<Message>> {
    let mut request = Message::from_args(request_def, args)?;
    let mut flags = NLM_F_REQUEST | NLM_F_ACK;
    if kind == ExchangeKind::Dump {
        flags |= NLM_F_DUMP;
    }
    request.header.nlmsg_flags = flags;

    let seq = socket.next_seq();
    let pid = socket.pid();
    request.header.nlmsg_seq = seq;
    request.header.nlmsg_pid = pid;

    let mut enc = Encoder::new();
    request.encode(request_def, &mut enc)?;
    let frame = enc.finish();
    trace!(request = %request_def.name, seq, len = frame.len(), "sending request");
    socket.send(&frame).await?;

    let mut replies = Vec::new();
    let mut done = false;
    while !done {
        let data = socket.recv().await?;
        let mut dec = Decoder::new(&data);
        while dec.available(NLMSG_HDRLEN) {
            let header = NlMsgHdr::decode(&mut dec)?;
            let payload_len = header.payload_len()?;

            if (header.nlmsg_seq, header.nlmsg_pid) != (seq, pid) {
                // Not ours: an unsolicited notification or a stale reply.
                debug!(
                    seq = header.nlmsg_seq,
                    pid = header.nlmsg_pid,
                    "skipping uncorrelated frame"
                );
                dec.skip(payload_len)?;
            } else if header.is_control() {
                match decode_control(&mut dec, &header)? {
                    ControlOutcome::Ack => {
                        trace!(seq, "acked");
                        if kind == ExchangeKind::Do {
                            done = true;
                        }
                    }
                    ControlOutcome::Failure(errno) => return Err(Error::from_errno(errno)),
                    ControlOutcome::Done => done = true,
                    ControlOutcome::Skip => {}
                }
            } else {
                let reply_def = reply_def.ok_or_else(|| {
                    Error::InvalidMessage(format!(
                        "unexpected reply of type {}",
                        header.nlmsg_type
                    ))
                })?;
                let message =
                    dec.with_limit(payload_len, |d| Message::decode(reply_def, d, header))?;
                replies.push(message);
                if kind == ExchangeKind::Do {
                    done = true;
                }
            }

            if dec.remaining() > 0 {
                dec.align_to(NLMSG_ALIGNTO)?;
            }
        }
    }

    Ok(replies)
}

/// Request/reply message shapes for one exchange mode of an operation.
#[derive(Debug, Clone)]
pub struct OpSpec {
    /// Request shape, if the mode accepts a request body.
    pub request: Option<Arc<MessageDef>>,
    /// Reply shape, if the mode produces payload replies.
    pub reply: Option<Arc<MessageDef>>,
}

/// One named family operation with its `do` and/or `dump` specs.
#[derive(Debug, Clone)]
pub struct OperationDef {
    /// Operation name from the schema.
    pub name: Arc<str>,
    /// Single-shot request/reply spec.
    pub doit: Option<OpSpec>,
    /// Dump request/reply spec.
    pub dumpit: Option<OpSpec>,
}

/// The runtime registry for one netlink family.
///
/// Built once from a resolved schema by the codec builder; immutable and
/// safe to share (`Arc`) across connections and tasks.
#[derive(Debug)]
pub struct FamilyDef {
    /// Family name.
    pub name: Arc<str>,
    /// Netlink protocol number the family speaks.
    pub protonum: isize,
    operations: HashMap<Arc<str>, OperationDef>,
}

impl FamilyDef {
    /// Build a family registry from its operations.
    pub fn new(
        name: impl Into<Arc<str>>,
        protonum: isize,
        operations: Vec<OperationDef>,
    ) -> Self {
        let operations = operations
            .into_iter()
            .map(|op| (Arc::clone(&op.name), op))
            .collect();
        Self {
            name: name.into(),
            protonum,
            operations,
        }
    }

    /// Look up an operation by name.
    pub fn operation(&self, name: &str) -> Option<&OperationDef> {
        self.operations.get(name)
    }

    /// Iterate over all operations.
    pub fn operations(&self) -> impl Iterator<Item = &OperationDef> {
        self.operations.values()
    }
}

/// A family bound to a transport: the callable surface of the engine.
///
/// One exchange is in flight at a time per connection; use separate
/// connections for concurrent requests.
pub struct Connection<S = NetlinkSocket> {
    family: Arc<FamilyDef>,
    socket: S,
}

impl Connection<NetlinkSocket> {
    /// Open a netlink socket on the family's protocol number.
    pub fn open(family: Arc<FamilyDef>) -> Result<Self> {
        let socket = NetlinkSocket::open(family.protonum)?;
        Ok(Self { family, socket })
    }
}

impl<S: Transport> Connection<S> {
    /// Bind a family registry to an existing transport.
    pub fn with_socket(family: Arc<FamilyDef>, socket: S) -> Self {
        Self { family, socket }
    }

    /// The family registry this connection speaks.
    pub fn family(&self) -> &FamilyDef {
        &self.family
    }

    /// The underlying transport.
    pub fn socket(&self) -> &S {
        &self.socket
    }

    async fn execute(
        &self,
        kind: ExchangeKind,
        op_name: &str,
        args: &[(&str, Value)],
    ) -> Result<Vec<Message>> {
        let op = self.family.operation(op_name).ok_or_else(|| {
            Error::NotSupported(format!("unknown operation: {}", op_name))
        })?;
        let spec = match kind {
            ExchangeKind::Do => op.doit.as_ref(),
            ExchangeKind::Dump => op.dumpit.as_ref(),
        }
        .ok_or_else(|| {
            let mode = match kind {
                ExchangeKind::Do => "do",
                ExchangeKind::Dump => "dump",
            };
            Error::NotSupported(format!("operation {} has no {} spec", op_name, mode))
        })?;
        let request_def = spec.request.as_deref().ok_or_else(|| {
            Error::NotSupported(format!("operation {} has no request shape", op_name))
        })?;

        exchange(&self.socket, kind, request_def, spec.reply.as_deref(), args)
            .await
            .map_err(|e| e.with_context(op_name.to_string()))
    }

    /// Run a `do` exchange: at most one reply, `None` for a pure ACK.
    pub async fn doit(&self, op_name: &str, args: &[(&str, Value)]) -> Result<Option<Message>> {
        let mut replies = self.execute(ExchangeKind::Do, op_name, args).await?;
        Ok(replies.pop())
    }

    /// Run a `dump` exchange: all replies in arrival order.
    pub async fn dumpit(&self, op_name: &str, args: &[(&str, Value)]) -> Result<Vec<Message>> {
        self.execute(ExchangeKind::Dump, op_name, args).await
    }
}
