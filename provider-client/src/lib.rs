//! Private framed TCP client for the CSTA provider
//!
//! The provider multiplexes every request, every response and every
//! unsolicited event over one TCP stream. This crate owns that stream:
//!
//! - [`frame`]: the 8 byte header + XML payload codec
//! - [`InvokeId`]: the 4 digit correlation token carried in each header
//! - [`ProviderConnection`]: serialised writes, a background reader task,
//!   and a status watch that flips to `Disconnected` on stream failure
//!
//! It knows nothing about CSTA documents; decoded frames are handed to a
//! [`FrameHandler`] supplied by the caller.

mod connection;
mod error;
pub mod frame;
mod invoke_id;

pub use connection::{
    ConnectOptions, ConnectionStatus, FrameHandler, FrameSink, ProviderConnection,
};
pub use error::{ProviderError, Result};
pub use frame::{encode_frame, read_frame, Frame};
pub use invoke_id::InvokeId;
