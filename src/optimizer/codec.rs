//! # 编解码模块
//!
//! ## 设计思路
//!
//! 纯函数，无状态：字节 → 像素，像素 → JPEG 字节。
//! 解码前先读头部尺寸做像素/内存上限检查，避免恶意输入触发高内存开销。
//!
//! ## 实现思路
//!
//! 1. `infer` 按魔数识别格式，失败时回退 `image::guess_format`
//! 2. 读取头部尺寸并校验上限
//! 3. 完整解码
//! 4. 编码前将透明通道合成到白底（JPEG 不支持透明）

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader, RgbImage};

use super::source::{ChannelLayout, RawPixels, SourceFormat};
use super::{OptimizeError, OptimizerConfig};

/// 按字节内容识别图片格式。
pub fn sniff_format(bytes: &[u8]) -> Result<SourceFormat, OptimizeError> {
    if let Some(format) = infer::get(bytes).and_then(|kind| SourceFormat::from_mime(kind.mime_type())) {
        return Ok(format);
    }

    image::guess_format(bytes)
        .ok()
        .and_then(SourceFormat::from_image_format)
        .ok_or_else(|| OptimizeError::Decode("不支持的图片格式".to_string()))
}

/// 仅通过图片头信息读取宽高。
fn inspect_dimensions(bytes: &[u8], format: SourceFormat) -> Result<(u32, u32), OptimizeError> {
    let mut reader = ImageReader::new(Cursor::new(bytes));
    reader.set_format(format.image_format());
    reader
        .into_dimensions()
        .map_err(|e| OptimizeError::Decode(format!("无法读取图片尺寸：{}", e)))
}

fn validate_limits(config: &OptimizerConfig, width: u32, height: u32) -> Result<(), OptimizeError> {
    if width == 0 || height == 0 {
        return Err(OptimizeError::Decode(format!("图片尺寸无效：{}x{}", width, height)));
    }

    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| OptimizeError::ResourceLimit("图片像素数溢出".to_string()))?;
    if pixels > config.max_decoded_pixels {
        return Err(OptimizeError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    let estimated = pixels
        .checked_mul(4)
        .ok_or_else(|| OptimizeError::ResourceLimit("图片解码内存估算溢出".to_string()))?;
    if estimated > config.max_decoded_bytes {
        return Err(OptimizeError::ResourceLimit(format!(
            "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
            estimated as f64 / 1024.0 / 1024.0,
            config.max_decoded_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(())
}

/// 将编码后的图片解码为像素缓冲。
pub fn decode(bytes: &[u8], config: &OptimizerConfig) -> Result<RawPixels, OptimizeError> {
    let format = sniff_format(bytes)?;
    let (header_width, header_height) = inspect_dimensions(bytes, format)?;
    validate_limits(config, header_width, header_height)?;

    let image = image::load_from_memory_with_format(bytes, format.image_format())
        .map_err(|e| OptimizeError::Decode(format!("图片解码失败：{}", e)))?;

    let (width, height) = (image.width(), image.height());
    validate_limits(config, width, height)?;

    Ok(RawPixels {
        width,
        height,
        layout: ChannelLayout::of(&image),
        image,
    })
}

/// 透明像素合成到白底。
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| -> u8 {
            let alpha = a as u32;
            ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8
        };
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

/// 以固定质量编码为 JPEG。
pub fn encode_jpeg(pixels: &RawPixels, quality: u8) -> Result<Vec<u8>, OptimizeError> {
    let rgb = flatten_onto_white(&pixels.image);
    let (width, height) = rgb.dimensions();

    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| OptimizeError::Encode(format!("JPEG 编码失败：{}", e)))?;

    Ok(buffer)
}
