use tokio::task::JoinError;

use crate::frame::Region;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failure reported by a capture backend.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("no display available")]
    NoDisplay,

    #[error("region {region} lies outside screen {screen}")]
    OutOfBounds { region: Region, screen: Region },

    #[error("captured buffer has {actual} bytes, expected {expected}")]
    ShortBuffer { expected: usize, actual: usize },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum QuantizeError {
    #[error("pixel buffer has {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("cannot quantize an empty image")]
    EmptyImage,

    #[error("palette size {0} out of range 4..=256")]
    PaletteSize(usize),

    #[error("sampling speed {0} out of range 1..=30")]
    Speed(i32),
}

#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("animation has no frames")]
    NoFrames,

    #[error("canvas {width}x{height} exceeds the 65535 pixel limit")]
    CanvasTooLarge { width: u32, height: u32 },

    #[error("frame {seq} is {width}x{height}, canvas is {canvas_width}x{canvas_height}")]
    FrameSize {
        seq: u64,
        width: u32,
        height: u32,
        canvas_width: u32,
        canvas_height: u32,
    },

    #[error("gif encoding: {0}")]
    Gif(#[from] gif::EncodingError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Terminal error of a capture session. Any per-frame failure aborts the whole session.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("invalid pipeline config: {0}")]
    Config(String),

    #[error("pipeline already started")]
    AlreadyStarted,

    #[error("cannot determine capture geometry: {0}")]
    Initialization(#[source] CaptureError),

    #[error("capture failed for frame {seq}: {source}")]
    Capture {
        seq: u64,
        #[source]
        source: CaptureError,
    },

    #[error("quantization failed for frame {seq}: {source}")]
    Quantization {
        seq: u64,
        #[source]
        source: QuantizeError,
    },

    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodeError),

    #[error("{stage} task terminated abnormally: {source}")]
    Task {
        stage: &'static str,
        #[source]
        source: JoinError,
    },

    #[error("{0} channel closed unexpectedly")]
    ChannelClosed(&'static str),

    #[error("frame accounting mismatch: captured {captured}, quantized {quantized}, assembled {assembled}")]
    FrameCount {
        captured: u64,
        quantized: u64,
        assembled: u64,
    },
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub(crate) fn task(stage: &'static str) -> impl FnOnce(JoinError) -> Self {
        move |source| Self::Task { stage, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_failing_frame() {
        let err = PipelineError::Quantization {
            seq: 7,
            source: QuantizeError::EmptyImage,
        };
        assert_eq!(
            err.to_string(),
            "quantization failed for frame 7: cannot quantize an empty image"
        );

        let err = PipelineError::Capture {
            seq: 3,
            source: CaptureError::NoDisplay,
        };
        assert!(err.to_string().contains("frame 3"));
    }

    #[test]
    fn test_initialization_keeps_source() {
        use std::error::Error as _;

        let err = PipelineError::Initialization(CaptureError::OutOfBounds {
            region: Region::new(0, 0, 10, 10),
            screen: Region::sized(5, 5),
        });
        assert!(err.to_string().contains("10x10+0+0"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_encode_error_converts() {
        let err: PipelineError = EncodeError::NoFrames.into();
        assert!(matches!(err, PipelineError::Encoding(EncodeError::NoFrames)));
    }
}
