use super::codec::Codec;
use crate::error::{AppError, Result};
use image::{DynamicImage, GenericImageView, ImageBuffer, Pixel};
use std::io::Write;

pub const DEFAULT_SCALE: u32 = 2;

/// Dimensions before and after one transcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeReport {
    pub source: (u32, u32),
    pub output: (u32, u32),
}

pub fn scaled_dimensions(width: u32, height: u32, k: u32) -> (u32, u32) {
    let k = k.max(1);
    (width / k, height / k)
}

/// Source coordinate sampled for destination coordinate `dst`, taken at the
/// pixel centre.
fn nearest(dst: u32, dst_len: u32, src_len: u32) -> u32 {
    let src = (2 * u64::from(dst) + 1) * u64::from(src_len) / (2 * u64::from(dst_len));
    // src < src_len, so this fits back into u32
    src.min(u64::from(src_len) - 1) as u32
}

type Buffer<P> = ImageBuffer<P, Vec<<P as Pixel>::Subpixel>>;

fn sample_nearest<P>(src: &Buffer<P>, width: u32, height: u32) -> Buffer<P>
where
    P: Pixel + 'static,
{
    let (src_w, src_h) = src.dimensions();
    ImageBuffer::from_fn(width, height, |x, y| {
        *src.get_pixel(nearest(x, width, src_w), nearest(y, height, src_h))
    })
}

/// Nearest-neighbour downscale that keeps the pixel layout of `img`.
pub fn downscale_nearest(img: &DynamicImage, width: u32, height: u32) -> Result<DynamicImage> {
    if width == 0 || height == 0 {
        return Err(AppError::Encode("scaled image is empty".into()));
    }

    let (w, h) = (width, height);
    Ok(match img {
        DynamicImage::ImageLuma8(buf) => DynamicImage::ImageLuma8(sample_nearest(buf, w, h)),
        DynamicImage::ImageLumaA8(buf) => DynamicImage::ImageLumaA8(sample_nearest(buf, w, h)),
        DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(sample_nearest(buf, w, h)),
        DynamicImage::ImageRgba8(buf) => DynamicImage::ImageRgba8(sample_nearest(buf, w, h)),
        DynamicImage::ImageLuma16(buf) => DynamicImage::ImageLuma16(sample_nearest(buf, w, h)),
        DynamicImage::ImageLumaA16(buf) => DynamicImage::ImageLumaA16(sample_nearest(buf, w, h)),
        DynamicImage::ImageRgb16(buf) => DynamicImage::ImageRgb16(sample_nearest(buf, w, h)),
        DynamicImage::ImageRgba16(buf) => DynamicImage::ImageRgba16(sample_nearest(buf, w, h)),
        DynamicImage::ImageRgb32F(buf) => DynamicImage::ImageRgb32F(sample_nearest(buf, w, h)),
        DynamicImage::ImageRgba32F(buf) => DynamicImage::ImageRgba32F(sample_nearest(buf, w, h)),
        other => DynamicImage::ImageRgba8(sample_nearest(&other.to_rgba8(), w, h)),
    })
}

/// Decodes `input`, shrinks it by `k` and writes the re-encoded image to
/// `output` in the same format.
///
/// Bytes reach `output` as the encoder produces them; nothing is buffered
/// here beyond the decoded and scaled images.
pub fn transcode<W: Write>(
    input: &[u8],
    codec: Codec,
    k: u32,
    output: &mut W,
) -> Result<TranscodeReport> {
    let img = codec.decode(input)?;
    let source = img.dimensions();
    let (width, height) = scaled_dimensions(source.0, source.1, k);

    let scaled = downscale_nearest(&img, width, height)?;
    drop(img);

    codec.encode(&scaled, output)?;

    Ok(TranscodeReport {
        source,
        output: (width, height),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::encode_image;
    use image::{GrayImage, ImageFormat, Luma};

    #[test]
    fn dimensions_are_floored() {
        assert_eq!(scaled_dimensions(640, 480, 2), (320, 240));
        assert_eq!(scaled_dimensions(101, 55, 4), (25, 13));
        assert_eq!(scaled_dimensions(3, 3, 4), (0, 0));
    }

    #[test]
    fn nearest_samples_pixel_centres() {
        assert_eq!(nearest(0, 2, 4), 1);
        assert_eq!(nearest(1, 2, 4), 3);
        assert_eq!(nearest(0, 2, 5), 1);
        assert_eq!(nearest(1, 2, 5), 3);
        assert_eq!(nearest(0, 1, 1), 0);
    }

    #[test]
    fn downscale_copies_pixels_without_blending() {
        let src = GrayImage::from_fn(4, 1, |x, _| Luma([(x as u8 + 1) * 10]));

        let out = downscale_nearest(&DynamicImage::ImageLuma8(src), 2, 1).unwrap();

        let out = out.as_luma8().unwrap();
        assert_eq!(out.get_pixel(0, 0), &Luma([20]));
        assert_eq!(out.get_pixel(1, 0), &Luma([40]));
    }

    #[test]
    fn downscale_keeps_pixel_layout() {
        let src = DynamicImage::ImageRgba16(ImageBuffer::new(8, 8));

        let out = downscale_nearest(&src, 4, 4).unwrap();

        assert!(matches!(out, DynamicImage::ImageRgba16(_)));
    }

    #[test]
    fn empty_destination_is_an_encode_error() {
        let src = DynamicImage::ImageLuma8(GrayImage::new(1, 5));

        let err = downscale_nearest(&src, 0, 2).unwrap_err();

        assert_eq!(err.kind(), "encode");
        assert!(err.to_string().contains("scaled image is empty"));
    }

    #[test]
    fn transcode_shrinks_and_keeps_format() {
        let input = encode_image(64, 48, ImageFormat::Png);
        let mut out = Vec::new();

        let codec = Codec::lookup("image/png").unwrap();
        let report = transcode(&input, codec, 4, &mut out).unwrap();

        assert_eq!(report.source, (64, 48));
        assert_eq!(report.output, (16, 12));
        let decoded = image::load_from_memory_with_format(&out, ImageFormat::Png).unwrap();
        assert_eq!(decoded.dimensions(), (16, 12));
    }

    #[test]
    fn transcode_surfaces_decode_errors() {
        let input = encode_image(8, 8, ImageFormat::Png);
        let mut out = Vec::new();

        let codec = Codec::lookup("image/jpeg").unwrap();
        let err = transcode(&input, codec, 2, &mut out).unwrap_err();

        assert_eq!(err.kind(), "decode");
        assert!(out.is_empty());
    }
}
