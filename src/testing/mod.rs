//! In-memory stand-ins for the object store and the queue.
//!
//! Both implement the same ports as the S3 and Kafka clients, so the worker
//! and the HTTP handlers run unchanged against them in tests and local runs.
//!
//! ```rust,ignore
//! let store = Arc::new(MemoryObjectStore::new());
//! let queue = Arc::new(MemoryQueue::new("images", 3));
//!
//! store.insert("raw", "a-raw.png", "image/png", fixtures::encode_image(8, 8, ImageFormat::Png));
//! let consumer = queue.consumer();
//! ```

mod memory_queue;
mod memory_store;

pub use memory_queue::{MemoryConsumer, MemoryQueue};
pub use memory_store::{GetGate, MemoryObjectStore, PutBehavior};

/// Test fixtures.
pub mod fixtures {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// Gradient image of the given size encoded as `format`.
    pub fn encode_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let rgb = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let img = match format {
            ImageFormat::Gif => DynamicImage::ImageRgba8(DynamicImage::ImageRgb8(rgb).to_rgba8()),
            _ => DynamicImage::ImageRgb8(rgb),
        };

        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format)
            .expect("fixture image must encode");
        out.into_inner()
    }
}
