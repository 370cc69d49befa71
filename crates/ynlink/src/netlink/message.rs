//! Netlink message header and framing constants.

use super::codec::{Decoder, Encoder};
use super::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Netlink message header alignment.
pub const NLMSG_ALIGNTO: usize = 4;

/// Align a length to NLMSG_ALIGNTO boundary.
#[inline]
pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

/// Size of the netlink message header.
pub const NLMSG_HDRLEN: usize = nlmsg_align(std::mem::size_of::<NlMsgHdr>());

/// Netlink message header (mirrors struct nlmsghdr).
///
/// All fields are host byte order on the wire. `nlmsg_len` counts header
/// plus payload, excluding inter-frame padding; it is patched after encode
/// because the payload length is not known up front.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlMsgHdr {
    /// Length of message including header.
    pub nlmsg_len: u32,
    /// Message type.
    pub nlmsg_type: u16,
    /// Additional flags.
    pub nlmsg_flags: u16,
    /// Sequence number.
    pub nlmsg_seq: u32,
    /// Sending process port ID.
    pub nlmsg_pid: u32,
}

impl NlMsgHdr {
    /// Create a new message header.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            nlmsg_len: NLMSG_HDRLEN as u32,
            nlmsg_type: msg_type,
            nlmsg_flags: flags,
            nlmsg_seq: 0,
            nlmsg_pid: 0,
        }
    }

    /// Get the payload length (total length minus header).
    ///
    /// Fails if the declared length does not cover the header itself.
    pub fn payload_len(&self) -> Result<usize> {
        (self.nlmsg_len as usize)
            .checked_sub(NLMSG_HDRLEN)
            .ok_or_else(|| {
                Error::InvalidMessage(format!("declared message length {} too short", self.nlmsg_len))
            })
    }

    /// Check if this is a reserved control message (NOOP/ERROR/DONE/OVERRUN).
    pub fn is_control(&self) -> bool {
        self.nlmsg_type < NlMsgType::MIN_TYPE
    }

    /// Check if this message has the multi flag.
    pub fn is_multi(&self) -> bool {
        self.nlmsg_flags & NLM_F_MULTI != 0
    }

    /// Convert header to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Decode a header from the cursor, self-aligning to 4 bytes.
    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let bytes = dec.bytes(std::mem::size_of::<Self>())?;
        let header = Self::read_from_bytes(bytes)
            .map_err(|_| Error::InvalidMessage("malformed message header".into()))?;
        dec.align_to(NLMSG_ALIGNTO)?;
        Ok(header)
    }

    /// Encode the header to the cursor, self-aligning to 4 bytes.
    pub fn encode(&self, enc: &mut Encoder) {
        enc.put_bytes(self.as_bytes());
        enc.align_to(NLMSG_ALIGNTO);
    }
}

/// Standard netlink message types.
///
/// Values below [`NlMsgType::MIN_TYPE`] are reserved control types; each
/// subsystem defines its own types from `MIN_TYPE` upward.
pub struct NlMsgType;

impl NlMsgType {
    /// No operation, message must be discarded.
    pub const NOOP: u16 = 1;
    /// Error message or ACK.
    pub const ERROR: u16 = 2;
    /// End of multipart message.
    pub const DONE: u16 = 3;
    /// Data lost, request resend.
    pub const OVERRUN: u16 = 4;

    /// First subsystem message type.
    pub const MIN_TYPE: u16 = 0x10;
}

/// Netlink message flags.
pub const NLM_F_REQUEST: u16 = 0x01;
pub const NLM_F_MULTI: u16 = 0x02;
pub const NLM_F_ACK: u16 = 0x04;
pub const NLM_F_ECHO: u16 = 0x08;
pub const NLM_F_DUMP_INTR: u16 = 0x10;
pub const NLM_F_DUMP_FILTERED: u16 = 0x20;

// Modifiers to GET request
pub const NLM_F_ROOT: u16 = 0x100;
pub const NLM_F_MATCH: u16 = 0x200;
pub const NLM_F_ATOMIC: u16 = 0x400;
pub const NLM_F_DUMP: u16 = NLM_F_ROOT | NLM_F_MATCH;

// Modifiers to NEW request
pub const NLM_F_REPLACE: u16 = 0x100;
pub const NLM_F_EXCL: u16 = 0x200;
pub const NLM_F_CREATE: u16 = 0x400;
pub const NLM_F_APPEND: u16 = 0x800;
