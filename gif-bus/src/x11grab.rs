//! X11 screen capture through FFmpeg's `x11grab` input device.

use std::ffi::CString;
use std::path::Path;
use std::sync::Mutex;

use ffmpeg_next::{Dictionary, format::Pixel};

use crate::{
    capture::ScreenCapture,
    error::CaptureError,
    frame::{PixelBuffer, Region},
};

/// Registers FFmpeg formats and devices. Call once before opening an [`X11Grab`].
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

struct GrabInput {
    region: Region,
    format: Pixel,
    inner: ffmpeg_next::format::context::Input,
}

pub struct X11Grab {
    display: String,
    framerate: u32,
    input: Mutex<Option<GrabInput>>,
}

impl X11Grab {
    /// `display` is an X11 display name such as `:0.0`.
    pub fn new(display: &str, framerate: u32) -> Self {
        Self {
            display: display.to_string(),
            framerate: framerate.max(1),
            input: Mutex::new(None),
        }
    }

    /// Resolve input format by name via FFmpeg's av_find_input_format.
    fn find_input_format(name: &str) -> anyhow::Result<ffmpeg_next::format::format::Input> {
        let cname = CString::new(name)
            .map_err(|e| anyhow::anyhow!("invalid format name {:?}: {}", name, e))?;
        let ptr = unsafe { ffmpeg_next::ffi::av_find_input_format(cname.as_ptr()) };
        if ptr.is_null() {
            return Err(anyhow::anyhow!("input format not found: {}", name));
        }
        Ok(unsafe { ffmpeg_next::format::format::Input::wrap(ptr as *mut _) })
    }

    fn open(&self, region: Option<Region>) -> anyhow::Result<GrabInput> {
        use ffmpeg_next::format::format::Format;

        let mut options = Dictionary::new();
        options.set("framerate", &self.framerate.to_string());
        options.set("draw_mouse", "1");
        let url = match region {
            Some(r) => {
                options.set("video_size", &format!("{}x{}", r.width, r.height));
                format!("{}+{},{}", self.display, r.x, r.y)
            }
            None => self.display.clone(),
        };

        let fmt = Self::find_input_format("x11grab")?;
        let ctx = ffmpeg_next::format::open_with(Path::new(&url), &Format::Input(fmt), options)?;
        let inner = ctx.input();

        let stream = inner
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or(anyhow::anyhow!("x11grab produced no video stream"))?;
        let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?
            .decoder()
            .video()?;
        let (width, height, format) = (decoder.width(), decoder.height(), decoder.format());
        log::debug!(
            "x11grab opened {}: {}x{} {:?}",
            url,
            width,
            height,
            format
        );

        let region = match region {
            Some(r) => r,
            None => Region::sized(width, height),
        };
        Ok(GrabInput {
            region,
            format,
            inner,
        })
    }
}

impl ScreenCapture for X11Grab {
    fn screen_region(&self) -> Result<Region, CaptureError> {
        let grab = self.open(None).map_err(|e| {
            log::error!("x11grab open on {} failed: {:#}", self.display, e);
            CaptureError::NoDisplay
        })?;
        let region = grab.region;
        if region.is_empty() {
            return Err(CaptureError::NoDisplay);
        }
        let mut slot = self.input.lock().map_err(|_| anyhow::anyhow!("x11grab lock poisoned"))?;
        *slot = Some(grab);
        Ok(region)
    }

    fn capture_frame(&self, region: Region) -> Result<PixelBuffer, CaptureError> {
        let mut slot = self.input.lock().map_err(|_| anyhow::anyhow!("x11grab lock poisoned"))?;
        if slot.as_ref().map(|g| g.region) != Some(region) {
            *slot = Some(self.open(Some(region))?);
        }
        let grab = slot
            .as_mut()
            .ok_or(anyhow::anyhow!("x11grab input not open"))?;

        let packet = match grab.inner.packets().next() {
            Some((_, packet)) => packet,
            None => return Err(anyhow::anyhow!("x11grab stream ended").into()),
        };
        let data = packet.data().unwrap_or_default();
        let expected = region.pixel_count() * PixelBuffer::CHANNELS;
        if data.len() < expected {
            return Err(CaptureError::ShortBuffer {
                expected,
                actual: data.len(),
            });
        }

        let mut rgba = Vec::with_capacity(expected);
        match grab.format {
            Pixel::BGRA | Pixel::BGRZ => {
                for px in data[..expected].chunks_exact(4) {
                    rgba.extend_from_slice(&[px[2], px[1], px[0], 0xff]);
                }
            }
            Pixel::RGBA | Pixel::RGBZ => {
                for px in data[..expected].chunks_exact(4) {
                    rgba.extend_from_slice(&[px[0], px[1], px[2], 0xff]);
                }
            }
            other => {
                return Err(anyhow::anyhow!("unsupported x11grab pixel format {:?}", other).into());
            }
        }
        Ok(PixelBuffer::new(region.width, region.height, rgba))
    }
}
