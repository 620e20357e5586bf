use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

pub type RawFrameSender = tokio::sync::mpsc::Sender<RawFrame>;
pub type RawFrameReceiver = tokio::sync::mpsc::Receiver<RawFrame>;
pub type PaletteFrameSender = tokio::sync::mpsc::Sender<PaletteFrame>;
pub type PaletteFrameReceiver = tokio::sync::mpsc::Receiver<PaletteFrame>;

/// Screen rectangle in pixels. `x`/`y` are the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Region of the given size anchored at the origin.
    pub fn sized(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether `other` lies entirely within this region.
    pub fn contains(&self, other: &Region) -> bool {
        let (x0, y0) = (self.x as i64, self.y as i64);
        let (x1, y1) = (x0 + self.width as i64, y0 + self.height as i64);
        let (ox0, oy0) = (other.x as i64, other.y as i64);
        let (ox1, oy1) = (ox0 + other.width as i64, oy0 + other.height as i64);
        ox0 >= x0 && oy0 >= y0 && ox1 <= x1 && oy1 <= y1
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid region {input:?}, expected WIDTHxHEIGHT[+X+Y]")]
pub struct RegionParseError {
    input: String,
}

impl FromStr for Region {
    type Err = RegionParseError;

    /// Parses `WIDTHxHEIGHT` or `WIDTHxHEIGHT+X+Y`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || RegionParseError {
            input: s.to_string(),
        };
        let mut parts = s.trim().split('+');
        let size = parts.next().ok_or_else(err)?;
        let (width, height) = size.split_once(['x', 'X']).ok_or_else(err)?;
        let width = width.parse::<u32>().map_err(|_| err())?;
        let height = height.parse::<u32>().map_err(|_| err())?;

        let offset: Vec<&str> = parts.collect();
        let (x, y) = match offset.as_slice() {
            [] => (0, 0),
            [x, y] => (
                x.parse::<i32>().map_err(|_| err())?,
                y.parse::<i32>().map_err(|_| err())?,
            ),
            _ => return Err(err()),
        };
        Ok(Region::new(x, y, width, height))
    }
}

/// Tightly packed RGBA8 pixels, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Bytes,
}

impl PixelBuffer {
    pub const CHANNELS: usize = 4;

    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Byte length implied by the dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * Self::CHANNELS
    }
}

/// One captured snapshot, stamped with the tick that requested it.
#[derive(Debug)]
pub struct RawFrame {
    seq: u64,
    timestamp: Instant,
    pixels: PixelBuffer,
}

impl RawFrame {
    pub fn new(seq: u64, timestamp: Instant, pixels: PixelBuffer) -> Self {
        Self {
            seq,
            timestamp,
            pixels,
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }
}

impl Display for RawFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "RawFrame seq: {}, size: {}x{}, data_len: {}",
            self.seq,
            self.pixels.width,
            self.pixels.height,
            self.pixels.data.len()
        )
    }
}

/// Indexed image: one palette index per pixel plus an RGB palette.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaletteImage {
    width: u32,
    height: u32,
    // packed RGB triples
    palette: Vec<u8>,
    indices: Bytes,
}

impl PaletteImage {
    pub fn new(width: u32, height: u32, palette: Vec<u8>, indices: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            palette,
            indices: indices.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn palette(&self) -> &[u8] {
        &self.palette
    }

    pub fn colors(&self) -> usize {
        self.palette.len() / 3
    }

    pub fn indices(&self) -> &[u8] {
        &self.indices
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaletteFrame {
    seq: u64,
    timestamp: Instant,
    image: PaletteImage,
}

impl PaletteFrame {
    pub fn new(seq: u64, timestamp: Instant, image: PaletteImage) -> Self {
        Self {
            seq,
            timestamp,
            image,
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn image(&self) -> &PaletteImage {
        &self.image
    }
}

impl Display for PaletteFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "PaletteFrame seq: {}, size: {}x{}, colors: {}",
            self.seq,
            self.image.width,
            self.image.height,
            self.image.colors()
        )
    }
}

/// How many times the finished animation plays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopMode {
    #[default]
    Infinite,
    Finite(u16),
}

/// Palette frames in capture order, ready for the encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderedAnimation {
    width: u32,
    height: u32,
    // centiseconds, applied to every frame
    delay: u16,
    repeat: LoopMode,
    frames: Vec<PaletteFrame>,
}

impl OrderedAnimation {
    pub(crate) fn new(
        width: u32,
        height: u32,
        delay: u16,
        repeat: LoopMode,
        frames: Vec<PaletteFrame>,
    ) -> Self {
        Self {
            width,
            height,
            delay,
            repeat,
            frames,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn delay(&self) -> u16 {
        self.delay
    }

    pub fn repeat(&self) -> LoopMode {
        self.repeat
    }

    pub fn frames(&self) -> &[PaletteFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Wall-clock distance between the first and last captured frame.
    pub fn span(&self) -> Duration {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => last.timestamp.duration_since(first.timestamp),
            _ => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_parse() {
        let region: Region = "800x600+10+20".parse().unwrap();
        assert_eq!(region, Region::new(10, 20, 800, 600));

        let region: Region = "1280x720".parse().unwrap();
        assert_eq!(region, Region::sized(1280, 720));

        assert!("800x".parse::<Region>().is_err());
        assert!("800x600+10".parse::<Region>().is_err());
        assert!("axb".parse::<Region>().is_err());
        assert!("800x600+1+2+3".parse::<Region>().is_err());
    }

    #[test]
    fn test_region_display_parses_back() {
        let region = Region::new(5, 7, 320, 240);
        assert_eq!(region.to_string(), "320x240+5+7");
        assert_eq!(region.to_string().parse::<Region>().unwrap(), region);
    }

    #[test]
    fn test_region_contains() {
        let screen = Region::sized(1920, 1080);
        assert!(screen.contains(&Region::new(0, 0, 1920, 1080)));
        assert!(screen.contains(&Region::new(100, 100, 800, 600)));
        assert!(!screen.contains(&Region::new(1500, 100, 800, 600)));
        assert!(!screen.contains(&Region::new(-1, 0, 10, 10)));
        assert!(Region::new(0, 0, 0, 10).is_empty());
    }

    #[test]
    fn test_animation_span() {
        let start = Instant::now();
        let image = PaletteImage::new(1, 1, vec![0, 0, 0], vec![0u8]);
        let frames = vec![
            PaletteFrame::new(0, start, image.clone()),
            PaletteFrame::new(1, start + Duration::from_millis(250), image),
        ];
        let animation = OrderedAnimation::new(1, 1, 0, LoopMode::Infinite, frames);
        assert_eq!(animation.span(), Duration::from_millis(250));
        assert_eq!(animation.len(), 2);
    }
}
