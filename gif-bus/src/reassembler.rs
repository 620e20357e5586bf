use futures::StreamExt;
use tokio::sync::oneshot;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    error::{PipelineError, PipelineResult},
    frame::{LoopMode, OrderedAnimation, PaletteFrame, PaletteFrameReceiver},
    pipeline::{PipelineState, StateHandle},
};

/// Buffers every palette frame of the session and restores capture order.
pub struct Reassembler {
    width: u32,
    height: u32,
    delay: u16,
    repeat: LoopMode,
}

impl Reassembler {
    pub fn new(width: u32, height: u32, delay: u16, repeat: LoopMode) -> Self {
        Self {
            width,
            height,
            delay,
            repeat,
        }
    }

    /// Drains `input` to closure, sorts, and hands the animation to `done` exactly once.
    pub async fn run(
        self,
        input: PaletteFrameReceiver,
        state: StateHandle,
        done: oneshot::Sender<OrderedAnimation>,
    ) -> PipelineResult<usize> {
        let frames: Vec<PaletteFrame> = ReceiverStream::new(input)
            .inspect(|frame| log::debug!("reassembler received {}", frame))
            .collect()
            .await;

        state.advance(PipelineState::Sorting);
        log::info!("reassembler sorting {} frames", frames.len());
        let animation = self.assemble(frames);
        let count = animation.len();
        done.send(animation)
            .map_err(|_| PipelineError::ChannelClosed("animation"))?;
        Ok(count)
    }

    /// Stable sort by capture timestamp; equal timestamps keep arrival order.
    pub fn assemble(&self, mut frames: Vec<PaletteFrame>) -> OrderedAnimation {
        frames.sort_by_key(|frame| frame.timestamp());
        OrderedAnimation::new(self.width, self.height, self.delay, self.repeat, frames)
    }
}
