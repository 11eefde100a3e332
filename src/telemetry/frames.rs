//! Asynchronous frame decoding with a "latest wins" draw guard.
//!
//! Each frame is tagged with the sequence number its event received on arrival. Decodes
//! run on a worker pool and may finish in any order; a finished decode is drawn only if
//! no newer frame has arrived since, otherwise it is discarded as stale. Queued frames
//! that are already superseded when a worker picks them up are skipped undecoded.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use thiserror::Error;

use super::protocol::FramePayload;
use crate::{lock_or_recover, log_debug};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not a base64 image data URL")]
    NotDataUrl,
    #[error("frame base64 is invalid: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("frame image could not be decoded: {0}")]
    Image(#[from] image::ImageError),
}

/// Decoded RGBA pixels scaled to the canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub trait FrameDecoder: Send + Sync {
    fn decode(&self, payload: &FramePayload) -> Result<DecodedFrame, FrameError>;
}

/// JPEG/PNG decoder that scales every frame to a fixed canvas size.
pub struct ImageFrameDecoder {
    canvas_width: u32,
    canvas_height: u32,
}

impl ImageFrameDecoder {
    pub fn new(canvas_width: u32, canvas_height: u32) -> Self {
        Self {
            canvas_width,
            canvas_height,
        }
    }
}

impl FrameDecoder for ImageFrameDecoder {
    fn decode(&self, payload: &FramePayload) -> Result<DecodedFrame, FrameError> {
        let bytes = payload.image_bytes()?;
        let mut rgba = image::load_from_memory(&bytes)?.to_rgba8();
        if rgba.width() != self.canvas_width || rgba.height() != self.canvas_height {
            rgba = image::imageops::resize(
                &rgba,
                self.canvas_width,
                self.canvas_height,
                image::imageops::FilterType::Triangle,
            );
        }
        Ok(DecodedFrame {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
        })
    }
}

/// Frame currently on the canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    pub seq: u64,
    pub frame: DecodedFrame,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Drawn { seq: u64 },
    /// A newer frame arrived before this decode finished.
    Stale { seq: u64 },
    Failed { seq: u64, error: String },
}

struct DecodeJob {
    seq: u64,
    payload: FramePayload,
}

/// Owns the canvas of one surface and the decode workers feeding it.
pub struct FrameRenderer {
    latest: Arc<AtomicU64>,
    canvas: Arc<Mutex<Option<RenderedFrame>>>,
    jobs: Option<Sender<DecodeJob>>,
    outcomes: Receiver<FrameOutcome>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl FrameRenderer {
    pub fn new(decoder: Arc<dyn FrameDecoder>, workers: usize) -> Self {
        let latest = Arc::new(AtomicU64::new(0));
        let canvas = Arc::new(Mutex::new(None));
        let (job_tx, job_rx) = unbounded::<DecodeJob>();
        let (outcome_tx, outcome_rx) = unbounded();

        let handles = (0..workers.max(1))
            .map(|_| {
                let job_rx = job_rx.clone();
                let outcome_tx = outcome_tx.clone();
                let decoder = Arc::clone(&decoder);
                let latest = Arc::clone(&latest);
                let canvas = Arc::clone(&canvas);
                thread::spawn(move || {
                    for job in job_rx.iter() {
                        // A backlog collapses to its newest frame without decoding the rest.
                        if latest.load(Ordering::SeqCst) > job.seq {
                            if outcome_tx.send(FrameOutcome::Stale { seq: job.seq }).is_err() {
                                break;
                            }
                            continue;
                        }
                        let outcome = match decoder.decode(&job.payload) {
                            Ok(frame) => commit(&latest, &canvas, job.seq, frame),
                            Err(err) => {
                                log_debug(&format!("frame {} decode failed: {err}", job.seq));
                                FrameOutcome::Failed {
                                    seq: job.seq,
                                    error: err.to_string(),
                                }
                            }
                        };
                        if outcome_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();

        Self {
            latest,
            canvas,
            jobs: Some(job_tx),
            outcomes: outcome_rx,
            workers: handles,
        }
    }

    /// Queue a frame. `seq` must come from the session's monotonically increasing counter.
    pub fn submit(&self, seq: u64, payload: FramePayload) {
        self.latest.fetch_max(seq, Ordering::SeqCst);
        if let Some(jobs) = &self.jobs {
            let _ = jobs.send(DecodeJob { seq, payload });
        }
    }

    pub fn latest_seq(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    /// Decode results in completion order.
    pub fn outcomes(&self) -> &Receiver<FrameOutcome> {
        &self.outcomes
    }

    pub fn current(&self) -> Option<RenderedFrame> {
        lock_or_recover(&self.canvas, "frame canvas").clone()
    }

    pub fn current_seq(&self) -> Option<u64> {
        lock_or_recover(&self.canvas, "frame canvas")
            .as_ref()
            .map(|rendered| rendered.seq)
    }
}

impl Drop for FrameRenderer {
    fn drop(&mut self) {
        self.jobs.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn commit(
    latest: &AtomicU64,
    canvas: &Mutex<Option<RenderedFrame>>,
    seq: u64,
    frame: DecodedFrame,
) -> FrameOutcome {
    let mut canvas = lock_or_recover(canvas, "frame canvas");
    // Checked under the canvas lock so two finishing decodes cannot both pass.
    let newer_arrived = latest.load(Ordering::SeqCst) > seq;
    let older_than_drawn = canvas.as_ref().is_some_and(|drawn| drawn.seq >= seq);
    if newer_arrived || older_than_drawn {
        return FrameOutcome::Stale { seq };
    }
    *canvas = Some(RenderedFrame { seq, frame });
    FrameOutcome::Drawn { seq }
}
