use std::time::Duration;

use crate::{
    error::{PipelineError, PipelineResult},
    frame::{LoopMode, Region},
};

/// What part of the screen to record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureTarget {
    #[default]
    Screen,
    Region(Region),
}

/// Pipeline configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub target: CaptureTarget,
    pub fps: u32,
    /// None = capture until the pipeline is cancelled
    pub duration: Option<Duration>,
    /// concurrent quantization workers
    pub workers: usize,
    /// captures allowed in flight at once
    pub capture_slots: usize,
    pub raw_buffer: usize,
    pub palette_buffer: usize,
    /// centiseconds each frame is shown
    pub frame_delay: u16,
    pub repeat: LoopMode,
}

impl PipelineConfig {
    pub const DEFAULT_FPS: u32 = 10;
    pub const DEFAULT_DURATION: Duration = Duration::from_secs(60);
    pub const DEFAULT_BUFFER: usize = 100;
    pub const DEFAULT_CAPTURE_SLOTS: usize = 4;

    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Twice the available parallelism.
    pub fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            * 2
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.fps == 0 {
            return Err(PipelineError::config("fps must be positive"));
        }
        if self.fps > 1000 {
            return Err(PipelineError::config(format!(
                "fps {} exceeds timer resolution",
                self.fps
            )));
        }
        if self.workers == 0 {
            return Err(PipelineError::config("workers must be positive"));
        }
        if self.capture_slots == 0 {
            return Err(PipelineError::config("capture_slots must be positive"));
        }
        if self.raw_buffer == 0 || self.palette_buffer == 0 {
            return Err(PipelineError::config("channel buffers must be positive"));
        }
        if let Some(d) = self.duration {
            if d.is_zero() {
                return Err(PipelineError::config("duration must be positive"));
            }
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target: CaptureTarget::Screen,
            fps: Self::DEFAULT_FPS,
            duration: Some(Self::DEFAULT_DURATION),
            workers: Self::default_workers(),
            capture_slots: Self::DEFAULT_CAPTURE_SLOTS,
            raw_buffer: Self::DEFAULT_BUFFER,
            palette_buffer: Self::DEFAULT_BUFFER,
            frame_delay: 0,
            repeat: LoopMode::Infinite,
        }
    }
}

#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Record the whole screen
    pub fn screen(mut self) -> Self {
        self.config.target = CaptureTarget::Screen;
        self
    }

    /// Record a fixed region
    pub fn region(mut self, region: Region) -> Self {
        self.config.target = CaptureTarget::Region(region);
        self
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.config.fps = fps;
        self
    }

    /// Stop capturing after `duration`
    pub fn duration(mut self, duration: Duration) -> Self {
        self.config.duration = Some(duration);
        self
    }

    /// Capture until cancelled
    pub fn until_cancelled(mut self) -> Self {
        self.config.duration = None;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn capture_slots(mut self, slots: usize) -> Self {
        self.config.capture_slots = slots;
        self
    }

    /// Capacity of both inter-stage channels
    pub fn buffer(mut self, capacity: usize) -> Self {
        self.config.raw_buffer = capacity;
        self.config.palette_buffer = capacity;
        self
    }

    pub fn frame_delay(mut self, centiseconds: u16) -> Self {
        self.config.frame_delay = centiseconds;
        self
    }

    pub fn repeat(mut self, repeat: LoopMode) -> Self {
        self.config.repeat = repeat;
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}
