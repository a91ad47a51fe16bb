//! Decode, downscale and re-encode, streamed into the object store.

pub mod bridge;
pub mod codec;
pub mod engine;
pub mod pipeline;

pub use codec::Codec;
pub use pipeline::{ProcessedImage, TranscodePipeline};
