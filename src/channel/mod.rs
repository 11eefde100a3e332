//! Control Channel between the core and each surface's isolated rendering context.
//!
//! Architecture:
//! - The core owns a [`ControlChannel`]: one request queue shared by all surfaces and
//!   one push queue per surface.
//! - Each rendering context owns a [`SurfaceEndpoint`] and never sees another surface.
//! - Pushes that concern shared state are broadcast to every attached surface.
//!
//! Protocol (JSON objects tagged with `"msg"` when crossing a process boundary):
//! - Surface → core: `getBackendPort`, `notifySystemState {active}`, `openMainWindow`
//! - Core → surface: `backendPort {port}`, `setSystemState {active}`

mod bridge;
mod protocol;


pub use bridge::{ControlChannel, Envelope, SurfaceEndpoint};
pub use protocol::{
    decode_push, decode_request, ChannelError, CoreReply, SurfacePush, SurfaceRequest,
};
