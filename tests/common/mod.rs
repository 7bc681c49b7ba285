// Shared fixtures: test images are generated in memory, nothing lives on disk.
#![allow(dead_code)]

use std::io::Cursor;
use std::time::{Duration, Instant};

use clipboard_optimizer::optimizer::OptimizerEvent;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage, Rgba};
use tokio::sync::mpsc::UnboundedReceiver;

/// Gradient with deterministic noise: large as PNG, compresses well as JPEG.
pub fn noisy_photo(width: u32, height: u32, seed: u32) -> DynamicImage {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    DynamicImage::ImageRgba8(ImageBuffer::from_fn(width, height, |x, y| {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let noise = ((state >> 16) % 32) as i32 - 16;
        let channel = |base: u32| (base as i32 + noise).clamp(0, 255) as u8;
        Rgba([
            channel(x * 255 / width.max(1)),
            channel(y * 255 / height.max(1)),
            channel((x + y) * 127 / (width + height).max(1)),
            255,
        ])
    }))
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, format)
        .expect("failed to encode fixture image");
    cursor.into_inner()
}

/// PNG screenshot-like payload well above the size floor.
pub fn large_png(seed: u32) -> Vec<u8> {
    encode(&noisy_photo(320, 240, seed), ImageFormat::Png)
}

/// Icon-sized PNG below the 4 KiB floor.
pub fn tiny_png() -> Vec<u8> {
    let icon = RgbImage::from_pixel(8, 8, Rgb([200, 40, 40]));
    encode(&DynamicImage::ImageRgb8(icon), ImageFormat::Png)
}

pub fn jpeg(quality: u8) -> Vec<u8> {
    let rgb = noisy_photo(320, 240, 7).to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(&rgb)
        .expect("failed to encode fixture jpeg");
    buffer
}

/// Collects every event currently queued on the channel.
pub fn drain(receiver: &mut UnboundedReceiver<OptimizerEvent>) -> Vec<OptimizerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

/// Polls until `done` holds or the deadline passes.
pub fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}
