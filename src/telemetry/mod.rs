//! Telemetry Session: the engine's event stream as seen by one surface.
//!
//! - `protocol`: newline-delimited JSON messages exchanged with the engine.
//! - `session`: connection worker with ordered delivery and bounded reconnects.
//! - `frames`: off-thread frame decoding guarded by arrival sequence numbers.

mod frames;
mod protocol;
mod session;

#[cfg(test)]
mod tests;

pub use frames::{
    DecodedFrame, FrameDecoder, FrameError, FrameOutcome, FrameRenderer, ImageFrameDecoder,
    RenderedFrame,
};
pub use protocol::{
    parse_server_line, ClientMessage, FramePayload, GestureTag, PlayPauseDisplay, ServerMessage,
    TelemetryEvent,
};
pub use session::{
    ReconnectPolicy, SessionConfig, SessionEvent, TelemetrySession, ToggleDelivery,
};
