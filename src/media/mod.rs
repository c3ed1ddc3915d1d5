mod encoder;
mod frames;

pub use encoder::{EncodeError, Encoder, FfmpegEncoder};
pub use frames::{FfmpegFrameSource, FrameError, FrameSource};
