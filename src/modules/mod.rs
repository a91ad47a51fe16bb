pub mod image;
pub mod transcode;
