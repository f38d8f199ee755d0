/// Built-in segmentation backends.
pub mod ffmpeg;
pub mod reference;

pub use ffmpeg::FfmpegBackend;
pub use reference::ReferenceBackend;
