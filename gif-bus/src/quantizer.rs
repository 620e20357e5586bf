use color_quant::NeuQuant;

use crate::{
    error::QuantizeError,
    frame::{PaletteImage, PixelBuffer},
};

/// Maps a truecolor image to an indexed one. Called from blocking worker threads.
pub trait Quantizer: Send + Sync + 'static {
    fn quantize(&self, pixels: &PixelBuffer) -> Result<PaletteImage, QuantizeError>;
}

/// NeuQuant neural-net quantizer, the same algorithm `gif` uses for truecolor frames.
#[derive(Clone, Debug)]
pub struct NeuQuantizer {
    colors: usize,
    // sampling factor: 1 is best quality, 30 is fastest
    speed: i32,
}

impl NeuQuantizer {
    pub const DEFAULT_COLORS: usize = 64;
    pub const DEFAULT_SPEED: i32 = 10;

    pub fn new(colors: usize, speed: i32) -> Result<Self, QuantizeError> {
        if !(4..=256).contains(&colors) {
            return Err(QuantizeError::PaletteSize(colors));
        }
        if !(1..=30).contains(&speed) {
            return Err(QuantizeError::Speed(speed));
        }
        Ok(Self { colors, speed })
    }

    pub fn colors(&self) -> usize {
        self.colors
    }
}

impl Default for NeuQuantizer {
    fn default() -> Self {
        Self {
            colors: Self::DEFAULT_COLORS,
            speed: Self::DEFAULT_SPEED,
        }
    }
}

impl Quantizer for NeuQuantizer {
    fn quantize(&self, pixels: &PixelBuffer) -> Result<PaletteImage, QuantizeError> {
        let data = pixels.data();
        if data.len() != pixels.expected_len() {
            return Err(QuantizeError::BufferSize {
                expected: pixels.expected_len(),
                actual: data.len(),
            });
        }
        if data.is_empty() {
            return Err(QuantizeError::EmptyImage);
        }

        let nq = NeuQuant::new(self.speed, self.colors, data);
        let indices: Vec<u8> = data
            .chunks_exact(PixelBuffer::CHANNELS)
            .map(|px| nq.index_of(px) as u8)
            .collect();
        Ok(PaletteImage::new(
            pixels.width(),
            pixels.height(),
            nq.color_map_rgb(),
            indices,
        ))
    }
}
