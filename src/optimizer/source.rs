//! # 中间数据模型
//!
//! - `OptimizationCandidate`：通过资格判断、已解码的候选图片
//! - `OptimizedResult`：编码产物及是否已写回剪贴板

use image::{DynamicImage, ImageFormat};

use crate::clipboard::ClipboardFormat;

/// 按字节识别出的图片格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Png,
    Jpeg,
    Bmp,
    Gif,
    Tiff,
    WebP,
}

impl SourceFormat {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(Self::Png),
            "image/jpeg" => Some(Self::Jpeg),
            "image/bmp" => Some(Self::Bmp),
            "image/gif" => Some(Self::Gif),
            "image/tiff" => Some(Self::Tiff),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Bmp => Some(Self::Bmp),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::Tiff => Some(Self::Tiff),
            ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Bmp => ImageFormat::Bmp,
            Self::Gif => ImageFormat::Gif,
            Self::Tiff => ImageFormat::Tiff,
            Self::WebP => ImageFormat::WebP,
        }
    }

    /// 是否已经是目标编码（JPEG）。
    pub fn is_target(self) -> bool {
        self == Self::Jpeg
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Bmp => "bmp",
            Self::Gif => "gif",
            Self::Tiff => "tiff",
            Self::WebP => "webp",
        }
    }
}

/// 像素通道布局。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Luma,
    LumaAlpha,
    Rgb,
    Rgba,
}

impl ChannelLayout {
    pub fn of(image: &DynamicImage) -> Self {
        match (image.color().channel_count(), image.color().has_alpha()) {
            (1, _) => Self::Luma,
            (2, _) => Self::LumaAlpha,
            (_, true) => Self::Rgba,
            _ => Self::Rgb,
        }
    }
}

/// 解码后的像素缓冲。
#[derive(Debug, Clone)]
pub struct RawPixels {
    pub width: u32,
    pub height: u32,
    pub layout: ChannelLayout,
    pub image: DynamicImage,
}

/// 通过资格判断的候选图片。
#[derive(Debug, Clone)]
pub struct OptimizationCandidate {
    /// 候选来自哪个剪贴板格式。
    pub origin: ClipboardFormat,
    pub source_format: SourceFormat,
    pub raw_pixels: RawPixels,
    /// 源负载字节数。
    pub original_size: u64,
}

/// 编码产物。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizedResult {
    pub encoded_bytes: Vec<u8>,
    pub new_size: u64,
    /// 是否已写回剪贴板。
    pub committed: bool,
}

impl OptimizedResult {
    pub fn new(encoded_bytes: Vec<u8>) -> Self {
        let new_size = encoded_bytes.len() as u64;
        Self {
            encoded_bytes,
            new_size,
            committed: false,
        }
    }
}
