//! Screen recording to animated GIF.
//!
//! [`pipeline::Pipeline`] captures frames at a fixed cadence, quantizes them on a bounded
//! worker pool and reassembles them in capture order before encoding.

pub mod capture;
pub mod config;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod pool;
pub mod quantizer;
pub mod reassembler;
pub mod source;
#[cfg(feature = "x11grab")]
pub mod x11grab;

#[cfg(feature = "x11grab")]
pub use x11grab::init;
