//! Capture session coordinator.
//!
//! Data Flow:
//! ```text
//!  ticker ─► FrameSource ──RawFrame──► QuantizePool ──PaletteFrame──► Reassembler
//!                                      (N workers,                     (buffer all,
//!                                       any order)                      sort by time)
//!                                                                           │ oneshot
//!                                                                           ▼
//!                                                          Pipeline ─► AnimationEncoder
//! ```
//!
//! Only the source observes cancellation. Once it stops, the frames already captured are
//! quantized, sorted and encoded to completion. Any stage failure aborts the rest and the
//! encoder is never called.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{
    capture::ScreenCapture,
    config::{CaptureTarget, PipelineConfig},
    encoder::AnimationEncoder,
    error::{CaptureError, EncodeError, PipelineError, PipelineResult},
    frame::Region,
    pool::{PoolReport, QuantizePool},
    quantizer::Quantizer,
    reassembler::Reassembler,
    source::FrameSource,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Capturing,
    Draining,
    Sorting,
    Encoding,
    Done,
    Failed,
}

impl PipelineState {
    fn rank(self) -> u8 {
        match self {
            PipelineState::Capturing => 0,
            PipelineState::Draining => 1,
            PipelineState::Sorting => 2,
            PipelineState::Encoding => 3,
            PipelineState::Done => 4,
            PipelineState::Failed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

/// Shared, forward-only view of the pipeline state.
#[derive(Clone)]
pub struct StateHandle {
    tx: Arc<watch::Sender<PipelineState>>,
    history: Arc<Mutex<Vec<PipelineState>>>,
}

impl StateHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PipelineState::Capturing);
        Self {
            tx: Arc::new(tx),
            history: Arc::new(Mutex::new(vec![PipelineState::Capturing])),
        }
    }

    /// Moves to `next` if it is later than the current state. Terminal states are final.
    pub fn advance(&self, next: PipelineState) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_terminal() || next.rank() <= current.rank() {
                return false;
            }
            log::debug!("pipeline state {:?} -> {:?}", current, next);
            *current = next;
            if let Ok(mut history) = self.history.lock() {
                history.push(next);
            }
            true
        })
    }

    pub fn current(&self) -> PipelineState {
        *self.tx.borrow()
    }

    /// Every state entered so far, oldest first. Watchers may coalesce changes; this does not.
    pub fn history(&self) -> Vec<PipelineState> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.tx.subscribe()
    }
}

impl Default for StateHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a successful session.
#[derive(Clone, Debug)]
pub struct Recording {
    pub data: Bytes,
    pub frames: usize,
    pub width: u32,
    pub height: u32,
    /// time between first and last captured frame
    pub span: Duration,
}

enum StageOutcome {
    Captured(u64),
    Quantized(PoolReport),
    Assembled(usize),
}

/// Pipeline: screen capture to animated image
pub struct Pipeline {
    config: PipelineConfig,
    capture: Arc<dyn ScreenCapture>,
    quantizer: Arc<dyn Quantizer>,
    encoder: Arc<dyn AnimationEncoder>,
    cancel: CancellationToken,
    state: StateHandle,
    started: AtomicBool,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        capture: Arc<dyn ScreenCapture>,
        quantizer: Arc<dyn Quantizer>,
        encoder: Arc<dyn AnimationEncoder>,
    ) -> Self {
        Self {
            config,
            capture,
            quantizer,
            encoder,
            cancel: CancellationToken::new(),
            state: StateHandle::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Stop capturing. Frames already captured are still encoded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn state(&self) -> PipelineState {
        self.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// States entered by this pipeline, in order.
    pub fn state_history(&self) -> Vec<PipelineState> {
        self.state.history()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the session to completion. Can only be called once.
    pub async fn run(&self) -> PipelineResult<Recording> {
        if self.started.swap(true, Ordering::Relaxed) {
            log::warn!("Pipeline already started");
            return Err(PipelineError::AlreadyStarted);
        }

        match self.run_inner().await {
            Ok(recording) => {
                self.state.advance(PipelineState::Done);
                log::info!(
                    "Pipeline: done, {} frames, {} bytes",
                    recording.frames,
                    recording.data.len()
                );
                Ok(recording)
            }
            Err(e) => {
                self.state.advance(PipelineState::Failed);
                log::error!("Pipeline: failed: {:#}", e);
                Err(e)
            }
        }
    }

    async fn run_inner(&self) -> PipelineResult<Recording> {
        self.config.validate()?;
        let region = self.resolve_region().await?;
        log::info!(
            "Pipeline: capturing {} at {} fps, duration {:?}",
            region,
            self.config.fps,
            self.config.duration
        );

        let capture_cancel = self.cancel.child_token();
        // stops the deadline timer and any leftover capture work on every exit path
        let _capture_guard = capture_cancel.clone().drop_guard();
        // a duration too large to represent never expires
        let deadline = self
            .config
            .duration
            .and_then(|duration| tokio::time::Instant::now().checked_add(duration));
        if let Some(deadline) = deadline {
            spawn_deadline(capture_cancel.clone(), deadline);
        }

        let (raw_tx, raw_rx) = mpsc::channel(self.config.raw_buffer);
        let (palette_tx, palette_rx) = mpsc::channel(self.config.palette_buffer);
        let (done_tx, done_rx) = oneshot::channel();

        let mut source = FrameSource::new(
            self.capture.clone(),
            region,
            self.config.frame_period(),
            self.config.capture_slots,
        );
        if let Some(deadline) = deadline {
            source = source.with_deadline(deadline);
        }
        let pool = QuantizePool::new(self.quantizer.clone(), self.config.workers);
        let reassembler = Reassembler::new(
            region.width,
            region.height,
            self.config.frame_delay,
            self.config.repeat,
        );

        // dropping the set aborts whatever is still running
        let mut stages: JoinSet<PipelineResult<StageOutcome>> = JoinSet::new();
        let source_state = self.state.clone();
        stages.spawn(async move {
            source
                .run(capture_cancel, raw_tx, source_state)
                .await
                .map(StageOutcome::Captured)
        });
        stages.spawn(async move {
            pool.run(raw_rx, palette_tx)
                .await
                .map(StageOutcome::Quantized)
        });
        let state = self.state.clone();
        stages.spawn(async move {
            reassembler
                .run(palette_rx, state, done_tx)
                .await
                .map(StageOutcome::Assembled)
        });

        let mut captured = 0;
        let mut quantized = 0;
        while let Some(joined) = stages.join_next().await {
            match joined.map_err(PipelineError::task("pipeline stage"))?? {
                StageOutcome::Captured(n) => {
                    captured = n;
                    log::info!("Pipeline: capture stopped with {} frames", n);
                }
                StageOutcome::Quantized(report) => {
                    quantized = report.quantized;
                }
                StageOutcome::Assembled(n) => {
                    log::info!("Pipeline: {} frames reassembled", n);
                }
            }
        }

        let animation = done_rx
            .await
            .map_err(|_| PipelineError::ChannelClosed("animation"))?;
        let assembled = animation.len() as u64;
        if captured != quantized || quantized != assembled {
            return Err(PipelineError::FrameCount {
                captured,
                quantized,
                assembled,
            });
        }

        self.state.advance(PipelineState::Encoding);
        let (frames, span) = (animation.len(), animation.span());
        let encoder = self.encoder.clone();
        let data = tokio::task::spawn_blocking(move || {
            let mut buf = Vec::new();
            encoder.encode_all(&mut buf, &animation)?;
            Ok::<_, EncodeError>(buf)
        })
        .await
        .map_err(PipelineError::task("encode"))??;

        Ok(Recording {
            data: Bytes::from(data),
            frames,
            width: region.width,
            height: region.height,
            span,
        })
    }

    async fn resolve_region(&self) -> PipelineResult<Region> {
        let capture = self.capture.clone();
        let screen = tokio::task::spawn_blocking(move || capture.screen_region())
            .await
            .map_err(PipelineError::task("init"))?
            .map_err(PipelineError::Initialization)?;

        match self.config.target {
            CaptureTarget::Screen => Ok(screen),
            CaptureTarget::Region(region) => {
                if region.is_empty() || !screen.contains(&region) {
                    return Err(PipelineError::Initialization(CaptureError::OutOfBounds {
                        region,
                        screen,
                    }));
                }
                Ok(region)
            }
        }
    }
}

fn spawn_deadline(cancel: CancellationToken, deadline: tokio::time::Instant) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                log::info!("Pipeline: capture deadline reached");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
