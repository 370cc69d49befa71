//! Generic Netlink definitions.
//!
//! GENL multiplexes many logical families over one netlink protocol via a
//! dynamically assigned family id (used as `nlmsg_type`) and a small
//! sub-header after the standard netlink header:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ nlmsghdr (16 bytes)                     │
//! ├─────────────────────────────────────────┤
//! │ genlmsghdr (4 bytes)                    │
//! │   cmd (u8), version (u8), reserved (u16)│
//! ├─────────────────────────────────────────┤
//! │ Attributes (TLV format)                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Schema families of kind `genetlink` declare the sub-header as an ordinary
//! fixed-header struct; this module carries the constants shared by every
//! genl family, including the fixed control family.

use super::codec::{Decoder, Encoder};
use super::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Protocol number of the generic netlink socket family.
pub const NETLINK_GENERIC: isize = 16;

/// Size of the GENL header in bytes.
pub const GENL_HDRLEN: usize = std::mem::size_of::<GenlMsgHdr>();

// Control family constants (fixed, not dynamically assigned)
pub const GENL_ID_CTRL: u16 = 0x10;

/// Generic Netlink message header.
///
/// This header immediately follows the standard netlink header in GENL messages.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct GenlMsgHdr {
    /// Command identifier (family-specific)
    pub cmd: u8,
    /// Interface version
    pub version: u8,
    /// Reserved for future use
    pub reserved: u16,
}

impl GenlMsgHdr {
    /// Create a new GENL header with the given command and version.
    #[inline]
    pub const fn new(cmd: u8, version: u8) -> Self {
        Self {
            cmd,
            version,
            reserved: 0,
        }
    }

    /// Get the header as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Decode the header from the cursor.
    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let bytes = dec.bytes(GENL_HDRLEN)?;
        Self::read_from_bytes(bytes)
            .map_err(|_| Error::InvalidMessage("malformed genl header".into()))
    }

    /// Encode the header to the cursor.
    pub fn encode(&self, enc: &mut Encoder) {
        enc.put_bytes(self.as_bytes());
    }
}

/// Control family commands
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlCmd {
    Unspec = 0,
    NewFamily = 1,
    DelFamily = 2,
    GetFamily = 3,
    NewOps = 4,
    DelOps = 5,
    GetOps = 6,
    NewMcastGrp = 7,
    DelMcastGrp = 8,
    GetMcastGrp = 9,
    GetPolicy = 10,
}

/// Control family attributes
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlAttr {
    Unspec = 0,
    FamilyId = 1,
    FamilyName = 2,
    Version = 3,
    HdrSize = 4,
    MaxAttr = 5,
    Ops = 6,
    McastGroups = 7,
    Policy = 8,
    OpPolicy = 9,
    Op = 10,
}

/// Control family multicast group attributes
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlAttrMcastGrp {
    Unspec = 0,
    Name = 1,
    Id = 2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genl_header_size() {
        assert_eq!(GENL_HDRLEN, 4);
    }

    #[test]
    fn test_genl_header_roundtrip() {
        let hdr = GenlMsgHdr::new(CtrlCmd::GetFamily as u8, 2);
        let mut enc = Encoder::new();
        hdr.encode(&mut enc);
        let buf = enc.finish();
        assert_eq!(buf.len(), GENL_HDRLEN);

        let parsed = GenlMsgHdr::decode(&mut Decoder::new(&buf)).unwrap();
        assert_eq!(parsed, hdr);
    }

    #[test]
    fn test_genl_header_too_short() {
        let data = [0x03u8, 0x01, 0x00]; // Only 3 bytes
        assert!(GenlMsgHdr::decode(&mut Decoder::new(&data)).is_err());
    }
}
