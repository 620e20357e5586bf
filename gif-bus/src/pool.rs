use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinSet},
};

use crate::{
    error::{PipelineError, PipelineResult},
    frame::{PaletteFrame, PaletteFrameSender, RawFrameReceiver},
    quantizer::Quantizer,
};

/// Counts workers currently holding an admission slot.
#[derive(Default)]
struct Occupancy {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Occupancy {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolReport {
    pub quantized: u64,
    /// highest number of workers admitted at the same time
    pub peak_workers: usize,
}

/// Quantizes frames on at most `workers` concurrent workers. Output order is completion order.
pub struct QuantizePool {
    quantizer: Arc<dyn Quantizer>,
    workers: usize,
}

impl QuantizePool {
    pub fn new(quantizer: Arc<dyn Quantizer>, workers: usize) -> Self {
        Self {
            quantizer,
            workers: workers.max(1),
        }
    }

    /// Consumes `input` until it closes, then waits for every admitted worker before
    /// dropping `output`.
    pub async fn run(
        self,
        mut input: RawFrameReceiver,
        output: PaletteFrameSender,
    ) -> PipelineResult<PoolReport> {
        let slots = Arc::new(Semaphore::new(self.workers));
        let occupancy = Arc::new(Occupancy::default());
        let mut running: JoinSet<PipelineResult<()>> = JoinSet::new();
        let mut admitted: u64 = 0;

        log::info!("quantize pool started, workers: {}", self.workers);

        loop {
            let permit = tokio::select! {
                biased;
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    Self::settle(joined)?;
                    continue;
                }
                permit = slots.clone().acquire_owned() => {
                    permit.map_err(|_| PipelineError::ChannelClosed("quantize slot"))?
                }
            };

            let frame = tokio::select! {
                biased;
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    Self::settle(joined)?;
                    continue;
                }
                frame = input.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                }
            };

            admitted += 1;
            occupancy.enter();
            let quantizer = self.quantizer.clone();
            let occupancy = occupancy.clone();
            let output = output.clone();
            running.spawn(async move {
                let (seq, timestamp) = (frame.seq(), frame.timestamp());
                let image = tokio::task::spawn_blocking(move || {
                    let frame = frame;
                    quantizer.quantize(frame.pixels())
                })
                .await
                .map_err(PipelineError::task("quantize"))?
                .map_err(|source| PipelineError::Quantization { seq, source })?;

                let palette = PaletteFrame::new(seq, timestamp, image);
                log::debug!("quantized {}", palette);
                output
                    .send(palette)
                    .await
                    .map_err(|_| PipelineError::ChannelClosed("palette frame"))?;
                occupancy.leave();
                drop(permit);
                Ok(())
            });
        }

        log::info!("quantize pool input closed, waiting for {} workers", running.len());
        while let Some(joined) = running.join_next().await {
            Self::settle(joined)?;
        }
        drop(output);

        let report = PoolReport {
            quantized: admitted,
            peak_workers: occupancy.peak.load(Ordering::SeqCst),
        };
        log::info!(
            "quantize pool finished, {} frames, peak workers: {}",
            report.quantized,
            report.peak_workers
        );
        Ok(report)
    }

    fn settle(joined: Result<PipelineResult<()>, JoinError>) -> PipelineResult<()> {
        joined.map_err(PipelineError::task("quantize"))?
    }
}
