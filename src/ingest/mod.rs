//! Producer Ingest
//!
//! Raw TCP listener for vehicle data acquisition units. Producers write UTF-8
//! JSON readings:
//!
//! ```text
//! {"battery_temperature": 31.7, "timestamp": 1700000000000}
//! ```
//!
//! ## Framing
//!
//! - `read-event` (default): every socket read is one message. This matches
//!   producers that write one reading per write call. Readings that TCP splits
//!   across reads, or packs into one read, arrive as malformed frames.
//! - `lines`: newline-terminated messages, reassembled across reads.
//!
//! Every connection gets its own warning detector; closing or failing one
//! connection never affects another.

mod connection;
mod listener;

pub use connection::{ConnectionSummary, Framing, IngestError, ProducerConnection};
pub use listener::IngestListener;
