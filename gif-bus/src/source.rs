use std::{sync::Arc, time::Duration};

use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinSet},
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    capture::ScreenCapture,
    error::{PipelineError, PipelineResult},
    frame::{RawFrame, RawFrameSender, Region},
    pipeline::{PipelineState, StateHandle},
};

/// Ticks at a fixed period and captures one frame per tick until cancelled.
pub struct FrameSource {
    capture: Arc<dyn ScreenCapture>,
    region: Region,
    period: Duration,
    slots: usize,
    deadline: Option<Instant>,
}

impl FrameSource {
    pub fn new(
        capture: Arc<dyn ScreenCapture>,
        region: Region,
        period: Duration,
        slots: usize,
    ) -> Self {
        Self {
            capture,
            region,
            period,
            slots: slots.max(1),
            deadline: None,
        }
    }

    /// Stop at the first tick at or after `deadline`. That tick is not captured.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Runs until `cancel` fires, then enters `Draining`, waits for in-flight captures and
    /// closes `output` by dropping it. Returns the number of frames delivered.
    pub async fn run(
        self,
        cancel: CancellationToken,
        output: RawFrameSender,
        state: StateHandle,
    ) -> PipelineResult<u64> {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let slots = Arc::new(Semaphore::new(self.slots));
        let mut in_flight: JoinSet<PipelineResult<()>> = JoinSet::new();
        let mut seq: u64 = 0;

        log::info!(
            "frame source started, region: {}, period: {:?}",
            self.region,
            self.period
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    break;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    Self::settle(joined)?;
                }
                tick = interval.tick() => {
                    if cancel.is_cancelled() || self.deadline.is_some_and(|d| tick >= d) {
                        break;
                    }
                    let permit = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            break;
                        }
                        permit = slots.clone().acquire_owned() => {
                            permit.map_err(|_| PipelineError::ChannelClosed("capture slot"))?
                        }
                    };

                    let frame_seq = seq;
                    seq += 1;
                    let capture = self.capture.clone();
                    let region = self.region;
                    let output = output.clone();
                    in_flight.spawn(async move {
                        let pixels = tokio::task::spawn_blocking(move || capture.capture_frame(region))
                            .await
                            .map_err(PipelineError::task("capture"))?
                            .map_err(|source| PipelineError::Capture { seq: frame_seq, source })?;
                        let frame = RawFrame::new(frame_seq, tick, pixels);
                        log::debug!("captured {}", frame);
                        output
                            .send(frame)
                            .await
                            .map_err(|_| PipelineError::ChannelClosed("raw frame"))?;
                        drop(permit);
                        Ok(())
                    });
                }
            }
        }

        // before `output` closes, so no later stage can move past Draining first
        state.advance(PipelineState::Draining);
        log::info!("frame source cancelled after {} ticks, draining captures", seq);
        drop(output);
        while let Some(joined) = in_flight.join_next().await {
            Self::settle(joined)?;
        }
        log::info!("frame source finished, {} frames", seq);
        Ok(seq)
    }

    fn settle(joined: Result<PipelineResult<()>, JoinError>) -> PipelineResult<()> {
        joined.map_err(PipelineError::task("capture"))?
    }
}
