//! Screen capture primitives.
//!
//! Implementations are blocking; the frame source runs every call on the blocking pool.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    error::CaptureError,
    frame::{PixelBuffer, Region},
};

pub trait ScreenCapture: Send + Sync + 'static {
    /// Full screen geometry. Failing here aborts the session before any frame is taken.
    fn screen_region(&self) -> Result<Region, CaptureError>;

    /// Grab one RGBA snapshot of `region`.
    fn capture_frame(&self, region: Region) -> Result<PixelBuffer, CaptureError>;
}

/// Synthetic screen drawing a scrolling gradient, one step per captured frame.
pub struct TestPattern {
    screen: Region,
    step: AtomicU64,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            screen: Region::sized(width, height),
            step: AtomicU64::new(0),
        }
    }
}

impl Default for TestPattern {
    fn default() -> Self {
        Self::new(320, 240)
    }
}

impl ScreenCapture for TestPattern {
    fn screen_region(&self) -> Result<Region, CaptureError> {
        if self.screen.is_empty() {
            return Err(CaptureError::NoDisplay);
        }
        Ok(self.screen)
    }

    fn capture_frame(&self, region: Region) -> Result<PixelBuffer, CaptureError> {
        if !self.screen.contains(&region) {
            return Err(CaptureError::OutOfBounds {
                region,
                screen: self.screen,
            });
        }
        let step = self.step.fetch_add(1, Ordering::Relaxed);
        let mut data = Vec::with_capacity(region.pixel_count() * PixelBuffer::CHANNELS);
        for row in 0..region.height as i64 {
            let y = region.y as i64 + row;
            for col in 0..region.width as i64 {
                let x = region.x as i64 + col;
                let shifted = x + step as i64 * 4;
                data.push((shifted & 0xff) as u8);
                data.push(((y + step as i64 * 2) & 0xff) as u8);
                data.push(((x ^ y) & 0xff) as u8);
                data.push(0xff);
            }
        }
        Ok(PixelBuffer::new(region.width, region.height, data))
    }
}
