use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use super::protocol::{ChannelError, CoreReply, SurfacePush, SurfaceRequest};
use crate::log_debug;
use crate::surfaces::SurfaceKind;

/// A request as the core receives it: who sent it and where to answer.
#[derive(Debug)]
pub struct Envelope {
    pub from: SurfaceKind,
    pub request: SurfaceRequest,
    pub reply: Option<Sender<CoreReply>>,
}

impl Envelope {
    /// Answer a request/response message. A vanished requester is not an error.
    pub fn respond(&self, reply: CoreReply) {
        if let Some(tx) = &self.reply {
            if tx.send(reply).is_err() {
                log_debug(&format!(
                    "{} went away before its {} reply",
                    self.from.label(),
                    self.request.name()
                ));
            }
        }
    }
}

/// Core side of the bridge. Holds one push sender per attached surface, in
/// attachment order, and the shared request queue.
pub struct ControlChannel {
    endpoints: Vec<(SurfaceKind, Sender<SurfacePush>)>,
    requests_tx: Sender<Envelope>,
    requests_rx: Receiver<Envelope>,
}

impl Default for ControlChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlChannel {
    pub fn new() -> Self {
        let (requests_tx, requests_rx) = unbounded();
        Self {
            endpoints: Vec::new(),
            requests_tx,
            requests_rx,
        }
    }

    /// Connect a surface. Re-attaching a kind replaces its previous endpoint.
    pub fn attach(&mut self, kind: SurfaceKind) -> SurfaceEndpoint {
        let (push_tx, push_rx) = unbounded();
        self.endpoints.retain(|(existing, _)| *existing != kind);
        self.endpoints.push((kind, push_tx));
        SurfaceEndpoint {
            kind,
            requests: self.requests_tx.clone(),
            pushes: push_rx,
        }
    }

    pub fn requests(&self) -> &Receiver<Envelope> {
        &self.requests_rx
    }

    pub fn attached(&self) -> Vec<SurfaceKind> {
        self.endpoints.iter().map(|(kind, _)| *kind).collect()
    }

    /// Deliver a push to one surface.
    pub fn push_to(&mut self, kind: SurfaceKind, push: SurfacePush) -> bool {
        let Some(index) = self.endpoints.iter().position(|(k, _)| *k == kind) else {
            return false;
        };
        if self.endpoints[index].1.send(push).is_err() {
            log_debug(&format!("{} endpoint gone; detaching", kind.label()));
            self.endpoints.remove(index);
            return false;
        }
        true
    }

    /// Deliver a push to every attached surface, originator included, in attachment
    /// order. Surfaces whose endpoint is gone are detached. Returns the delivery count.
    pub fn broadcast(&mut self, push: SurfacePush) -> usize {
        let mut delivered = 0;
        self.endpoints.retain(|(kind, tx)| match tx.send(push) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                log_debug(&format!("{} endpoint gone; detaching", kind.label()));
                false
            }
        });
        delivered
    }
}

/// Surface side of the bridge, owned by that surface's rendering context.
pub struct SurfaceEndpoint {
    kind: SurfaceKind,
    requests: Sender<Envelope>,
    pushes: Receiver<SurfacePush>,
}

impl SurfaceEndpoint {
    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    pub fn pushes(&self) -> &Receiver<SurfacePush> {
        &self.pushes
    }

    /// Fire-and-forget request.
    pub fn send(&self, request: SurfaceRequest) -> Result<(), ChannelError> {
        self.requests
            .send(Envelope {
                from: self.kind,
                request,
                reply: None,
            })
            .map_err(|_| ChannelError::Disconnected)
    }

    /// Request/response round trip for the engine port.
    pub fn get_backend_port(&self, timeout: Duration) -> Result<u16, ChannelError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.requests
            .send(Envelope {
                from: self.kind,
                request: SurfaceRequest::GetBackendPort,
                reply: Some(reply_tx),
            })
            .map_err(|_| ChannelError::Disconnected)?;
        match reply_rx.recv_timeout(timeout) {
            Ok(CoreReply::BackendPort { port }) => Ok(port),
            Err(RecvTimeoutError::Timeout) => Err(ChannelError::ReplyTimeout("getBackendPort")),
            Err(RecvTimeoutError::Disconnected) => Err(ChannelError::Disconnected),
        }
    }

    pub fn notify_system_state(&self, active: bool) -> Result<(), ChannelError> {
        self.send(SurfaceRequest::NotifySystemState { active })
    }

    pub fn open_main_window(&self) -> Result<(), ChannelError> {
        self.send(SurfaceRequest::OpenMainWindow)
    }
}
