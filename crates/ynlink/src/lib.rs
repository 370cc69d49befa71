//! Schema-driven netlink library for Linux.
//!
//! This crate implements the netlink wire protocol end to end (binary
//! framing, aligned TLV attributes, request/reply exchanges with
//! multi-message dumps), driven entirely by declarative family
//! descriptions. A YAML document (the kernel's YNL specification layout)
//! describes a family's types, attribute sets, and operations; the engine
//! turns it into runtime codecs and callable operations. No per-family code
//! is generated or compiled.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ynlink::netlink::{Connection, Value};
//! use ynlink::schema::{self, Family};
//!
//! #[tokio::main]
//! async fn main() -> ynlink::Result<()> {
//!     let family = Family::parse(&std::fs::read_to_string("rt_link.yaml")?)?;
//!     let registry = Arc::new(schema::build_family(&family)?);
//!
//!     let conn = Connection::open(registry)?;
//!     for link in conn.dumpit("getlink", &[]).await? {
//!         println!("{:?}: {:?}", link.get("ifindex"), link.get("ifname"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod netlink;
pub mod schema;

// Re-export common types at crate root for convenience
pub use netlink::{Connection, Error, Result, Value};
