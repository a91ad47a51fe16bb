use crate::error::{AppError, Result};
use image::codecs::bmp::BmpEncoder;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{DynamicImage, Frame, ImageError, ImageFormat, ImageResult};
use std::io::{Cursor, Write};

type EncodeFn = fn(&DynamicImage, &mut dyn Write) -> ImageResult<()>;

/// A decoder/encoder pair for one image format.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    name: &'static str,
    content_types: &'static [&'static str],
    format: ImageFormat,
    encode: EncodeFn,
}

/// Every format the converter can decode and re-encode. Supporting a new
/// format is one entry here.
pub const REGISTRY: &[Codec] = &[
    Codec {
        name: "jpeg",
        content_types: &["image/jpeg", "image/jpg"],
        format: ImageFormat::Jpeg,
        encode: encode_jpeg,
    },
    Codec {
        name: "png",
        content_types: &["image/png"],
        format: ImageFormat::Png,
        encode: encode_png,
    },
    Codec {
        name: "gif",
        content_types: &["image/gif"],
        format: ImageFormat::Gif,
        encode: encode_gif,
    },
    Codec {
        name: "bmp",
        content_types: &["image/bmp", "image/x-ms-bmp"],
        format: ImageFormat::Bmp,
        encode: encode_bmp,
    },
    Codec {
        name: "tiff",
        content_types: &["image/tiff", "image/tif"],
        format: ImageFormat::Tiff,
        encode: encode_tiff,
    },
];

impl PartialEq for Codec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Codec {}

impl Codec {
    /// Resolves a content type, ignoring case and any `;` parameters.
    pub fn lookup(content_type: &str) -> Result<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();

        REGISTRY
            .iter()
            .find(|codec| {
                codec
                    .content_types
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(essence))
            })
            .copied()
            .ok_or_else(|| AppError::UnsupportedFormat(content_type.to_string()))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory_with_format(bytes, self.format)
            .map_err(|e| AppError::Decode(e.to_string()))
    }

    /// Encodes with default settings. Pixel layouts an encoder cannot take
    /// are converted to the closest 8-bit layout first.
    pub fn encode(&self, img: &DynamicImage, output: &mut dyn Write) -> Result<()> {
        (self.encode)(img, output).map_err(|e| AppError::Encode(e.to_string()))
    }
}

fn encode_jpeg(img: &DynamicImage, mut output: &mut dyn Write) -> ImageResult<()> {
    let encoder = JpegEncoder::new(&mut output);
    match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img.write_with_encoder(encoder),
        _ => DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder),
    }
}

fn encode_png(img: &DynamicImage, mut output: &mut dyn Write) -> ImageResult<()> {
    let encoder = PngEncoder::new(&mut output);
    match img {
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
            DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)
        }
        _ => img.write_with_encoder(encoder),
    }
}

fn encode_gif(img: &DynamicImage, mut output: &mut dyn Write) -> ImageResult<()> {
    let mut encoder = GifEncoder::new(&mut output);
    // The trailer is written when the encoder drops.
    encoder.encode_frame(Frame::new(img.to_rgba8()))
}

fn encode_bmp(img: &DynamicImage, mut output: &mut dyn Write) -> ImageResult<()> {
    let encoder = BmpEncoder::new(&mut output);
    match img {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => img.write_with_encoder(encoder),
        _ if img.color().has_alpha() => {
            DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)
        }
        _ => DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder),
    }
}

fn encode_tiff(img: &DynamicImage, output: &mut dyn Write) -> ImageResult<()> {
    // The TIFF encoder seeks back to patch offsets, so the file is assembled
    // in memory and written out in one go.
    let mut buffer = Cursor::new(Vec::new());
    let encoder = TiffEncoder::new(&mut buffer);
    match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => {
            img.write_with_encoder(encoder)?
        }
        _ => DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)?,
    }
    output.write_all(buffer.get_ref()).map_err(ImageError::IoError)
}
