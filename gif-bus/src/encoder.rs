use std::borrow::Cow;
use std::io::Write;

use gif::{Encoder, Frame as GifFrame, Repeat};

use crate::{
    error::EncodeError,
    frame::{LoopMode, OrderedAnimation},
};

/// Serializes a complete, ordered animation in one pass.
pub trait AnimationEncoder: Send + Sync + 'static {
    fn encode_all(
        &self,
        writer: &mut dyn Write,
        animation: &OrderedAnimation,
    ) -> Result<(), EncodeError>;
}

/// Animated GIF with a local palette per frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct GifEncoder;

impl GifEncoder {
    fn dimension(animation: &OrderedAnimation) -> Result<(u16, u16), EncodeError> {
        let too_large = || EncodeError::CanvasTooLarge {
            width: animation.width(),
            height: animation.height(),
        };
        let width = u16::try_from(animation.width()).map_err(|_| too_large())?;
        let height = u16::try_from(animation.height()).map_err(|_| too_large())?;
        Ok((width, height))
    }
}

impl AnimationEncoder for GifEncoder {
    fn encode_all(
        &self,
        writer: &mut dyn Write,
        animation: &OrderedAnimation,
    ) -> Result<(), EncodeError> {
        if animation.is_empty() {
            return Err(EncodeError::NoFrames);
        }
        let (width, height) = Self::dimension(animation)?;

        let mut encoder = Encoder::new(writer, width, height, &[])?;
        encoder.set_repeat(match animation.repeat() {
            LoopMode::Infinite => Repeat::Infinite,
            LoopMode::Finite(n) => Repeat::Finite(n),
        })?;

        for frame in animation.frames() {
            let image = frame.image();
            if image.width() != animation.width() || image.height() != animation.height() {
                return Err(EncodeError::FrameSize {
                    seq: frame.seq(),
                    width: image.width(),
                    height: image.height(),
                    canvas_width: animation.width(),
                    canvas_height: animation.height(),
                });
            }
            let gif_frame = GifFrame {
                width,
                height,
                delay: animation.delay(),
                palette: Some(image.palette().to_vec()),
                buffer: Cow::Borrowed(image.indices()),
                ..GifFrame::default()
            };
            encoder.write_frame(&gif_frame)?;
        }

        // writes the trailer
        let _ = encoder.into_inner()?;
        log::debug!(
            "gif encoded {} frames at {}x{}",
            animation.len(),
            width,
            height
        );
        Ok(())
    }
}
