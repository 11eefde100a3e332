//! Control Channel message set. Messages are tagged with `"msg"` on the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// ============================================================================
// Surface → core
// ============================================================================

/// Requests a surface's rendering context may send to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "camelCase")]
pub enum SurfaceRequest {
    /// Ask for the engine port; answered with [`CoreReply::BackendPort`].
    GetBackendPort,
    /// Report a new system-active value; the core records and rebroadcasts it.
    NotifySystemState { active: bool },
    /// Show and focus the main window.
    OpenMainWindow,
}

impl SurfaceRequest {
    pub fn name(&self) -> &'static str {
        match self {
            SurfaceRequest::GetBackendPort => "getBackendPort",
            SurfaceRequest::NotifySystemState { .. } => "notifySystemState",
            SurfaceRequest::OpenMainWindow => "openMainWindow",
        }
    }

    fn fields_for(name: &str) -> Option<&'static [&'static str]> {
        match name {
            "getBackendPort" | "openMainWindow" => Some(&[]),
            "notifySystemState" => Some(&["active"]),
            _ => None,
        }
    }
}

// ============================================================================
// Core → surface
// ============================================================================

/// Pushes the core delivers to surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "camelCase")]
pub enum SurfacePush {
    /// Sent once to each newly created surface.
    BackendPort { port: u16 },
    /// Broadcast to every surface whenever the system-active value changes.
    SetSystemState { active: bool },
}

impl SurfacePush {
    pub fn name(&self) -> &'static str {
        match self {
            SurfacePush::BackendPort { .. } => "backendPort",
            SurfacePush::SetSystemState { .. } => "setSystemState",
        }
    }

    fn fields_for(name: &str) -> Option<&'static [&'static str]> {
        match name {
            "backendPort" => Some(&["port"]),
            "setSystemState" => Some(&["active"]),
            _ => None,
        }
    }
}

/// Responses to request/response messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "msg", rename_all = "camelCase")]
pub enum CoreReply {
    BackendPort { port: u16 },
}

// ============================================================================
// Validation
// ============================================================================

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("malformed channel message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("channel message must be a JSON object")]
    NotAnObject,
    #[error("channel message is missing the \"msg\" tag")]
    MissingTag,
    #[error("unknown channel message '{0}'")]
    UnknownMessage(String),
    #[error("unexpected field '{field}' in '{msg}'")]
    UnexpectedField { msg: String, field: String },
    #[error("control channel disconnected")]
    Disconnected,
    #[error("no reply to '{0}' before timeout")]
    ReplyTimeout(&'static str),
}

/// Decode a surface request, rejecting anything outside the enumerated message set.
pub fn decode_request(value: &Value) -> Result<SurfaceRequest, ChannelError> {
    check_shape(value, SurfaceRequest::fields_for)?;
    Ok(serde_json::from_value(value.clone())?)
}

/// Decode a core push with the same strictness as requests.
pub fn decode_push(value: &Value) -> Result<SurfacePush, ChannelError> {
    check_shape(value, SurfacePush::fields_for)?;
    Ok(serde_json::from_value(value.clone())?)
}

fn check_shape(
    value: &Value,
    fields_for: fn(&str) -> Option<&'static [&'static str]>,
) -> Result<(), ChannelError> {
    let object: &Map<String, Value> = value.as_object().ok_or(ChannelError::NotAnObject)?;
    let name = object
        .get("msg")
        .and_then(Value::as_str)
        .ok_or(ChannelError::MissingTag)?;
    let allowed = fields_for(name).ok_or_else(|| ChannelError::UnknownMessage(name.to_string()))?;
    if let Some(field) = object
        .keys()
        .find(|key| key.as_str() != "msg" && !allowed.contains(&key.as_str()))
    {
        return Err(ChannelError::UnexpectedField {
            msg: name.to_string(),
            field: field.clone(),
        });
    }
    Ok(())
}
