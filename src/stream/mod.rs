//! Wire stream handling: frame reassembly and event parsing.
//!
//! The server answers a batch submission with an event stream — frames
//! separated by a blank line, each carrying a JSON payload on `data:`
//! lines. `decoder` rebuilds complete frames out of arbitrarily chunked
//! bytes; `event` turns one frame into a typed [`ProtocolEvent`].

pub mod decoder;
pub mod event;

pub use decoder::FrameDecoder;
pub use event::{parse_frame, ProtocolEvent, Stage};
