//! 剪贴板图片规范化
//!
//! # 设计思路
//!
//! 系统剪贴板给出的是未压缩的 RGBA 像素。入库前统一：
//! 1. 像素数超过上限直接拒绝，避免大图拖垮捕获循环；
//! 2. 保持宽高比缩放到 800×600 以内（只缩小不放大）；
//! 3. 重新编码为 PNG，并以 `data:image/png;base64,` URL 形式存入内容字段。
//!
//! 写回剪贴板时走相反方向：解析 data URL → 解码 → RGBA。
//!
//! # 实现思路
//!
//! - 缩放优先使用 `fast_image_resize`（SIMD 卷积），失败时回退 `image::resize_exact`。
//! - 解码 data URL 前先读取头部尺寸，超限时不做完整解码。

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use fast_image_resize as fr;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageFormat, Rgba};

use crate::error::AppError;

pub const MAX_WIDTH: u32 = 800;
pub const MAX_HEIGHT: u32 = 600;
/// 单张图片允许的最大像素数
pub const MAX_PIXELS: u64 = 40_000_000;
pub const DATA_URL_PREFIX: &str = "data:image/png;base64,";
pub const ENCODED_FORMAT: &str = "png";

/// 剪贴板原始图片（RGBA8，逐行紧密排列）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

/// 规范化后的图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data_url: String,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
}

fn validate_pixel_limits(width: u64, height: u64) -> Result<(), AppError> {
    let pixels = width
        .checked_mul(height)
        .ok_or_else(|| AppError::Image("图片像素数溢出".to_string()))?;
    if pixels == 0 {
        return Err(AppError::Image("图片尺寸为 0".to_string()));
    }
    if pixels > MAX_PIXELS {
        return Err(AppError::Image(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, MAX_PIXELS
        )));
    }
    Ok(())
}

/// 计算保持宽高比、不超过边界的目标尺寸；已在边界内时原样返回
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let scale = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);
    let target_width = ((width as f64 * scale).round() as u32).clamp(1, max_width);
    let target_height = ((height as f64 * scale).round() as u32).clamp(1, max_height);
    (target_width, target_height)
}

fn resize_with_fast_image_resize(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
) -> Result<DynamicImage, AppError> {
    let src = image.to_rgba8();
    let (src_width, src_height) = src.dimensions();

    let src_image = fr::images::Image::from_vec_u8(
        src_width,
        src_height,
        src.into_raw(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| AppError::Image(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let options = fr::ResizeOptions::new()
        .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| AppError::Image(format!("fast_image_resize 执行失败：{}", e)))?;

    let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(
        target_width,
        target_height,
        dst_image.into_vec(),
    )
    .ok_or_else(|| AppError::Image("fast_image_resize 输出缓冲长度异常".to_string()))?;

    Ok(DynamicImage::ImageRgba8(rgba))
}

fn downscale(image: DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (target_width, target_height) = fit_within(width, height, MAX_WIDTH, MAX_HEIGHT);
    if (target_width, target_height) == (width, height) {
        return image;
    }

    log::debug!("🧩 图片降采样：{}x{} -> {}x{}", width, height, target_width, target_height);

    match resize_with_fast_image_resize(&image, target_width, target_height) {
        Ok(resized) => resized,
        Err(err) => {
            log::warn!("⚠️ fast_image_resize 降采样失败，回退 image::resize_exact：{}", err);
            image.resize_exact(target_width, target_height, FilterType::Lanczos3)
        }
    }
}

/// 将剪贴板原始像素规范化为 data URL
pub fn normalize_image(raw: &RawImage) -> Result<EncodedImage, AppError> {
    validate_pixel_limits(raw.width as u64, raw.height as u64)?;

    let original_width = u32::try_from(raw.width)
        .map_err(|_| AppError::Image(format!("图片宽度超出范围: {}", raw.width)))?;
    let original_height = u32::try_from(raw.height)
        .map_err(|_| AppError::Image(format!("图片高度超出范围: {}", raw.height)))?;

    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(
        original_width,
        original_height,
        raw.rgba.clone(),
    )
    .ok_or_else(|| AppError::Image("像素数据长度与尺寸不匹配".to_string()))?;

    let image = downscale(DynamicImage::ImageRgba8(buffer));
    let (width, height) = image.dimensions();

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| AppError::Image(format!("PNG 编码失败：{}", e)))?;

    Ok(EncodedImage {
        data_url: format!("{}{}", DATA_URL_PREFIX, STANDARD.encode(&png)),
        width,
        height,
        original_width,
        original_height,
    })
}

/// 从 data URL 解码为 RGBA 像素（写回剪贴板用）
pub fn decode_data_url(data_url: &str) -> Result<RawImage, AppError> {
    let encoded = data_url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(_, payload)| payload)
        .ok_or_else(|| AppError::Image("不是 base64 图片 data URL".to_string()))?;

    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| AppError::Image(format!("base64 解码失败：{}", e)))?;

    let (header_width, header_height) = image::ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|e| AppError::Image(format!("无法识别图片格式：{}", e)))?
        .into_dimensions()
        .map_err(|e| AppError::Image(format!("无法读取图片尺寸：{}", e)))?;
    validate_pixel_limits(header_width as u64, header_height as u64)?;

    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| AppError::Image(format!("图片解码失败：{}", e)))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();

    Ok(RawImage {
        width: width as usize,
        height: height as usize,
        rgba: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: usize, height: usize) -> RawImage {
        RawImage {
            width,
            height,
            rgba: [10u8, 20, 30, 255].repeat(width * height),
        }
    }

    #[test]
    fn fit_within_preserves_aspect_ratio() {
        assert_eq!(fit_within(1600, 1200, 800, 600), (800, 600));
        assert_eq!(fit_within(1600, 400, 800, 600), (800, 200));
        assert_eq!(fit_within(300, 1200, 800, 600), (150, 600));
        assert_eq!(fit_within(640, 480, 800, 600), (640, 480));
    }

    #[test]
    fn small_image_keeps_size_and_round_trips() {
        let raw = solid(4, 3);
        let encoded = normalize_image(&raw).expect("normalize");
        assert!(encoded.data_url.starts_with(DATA_URL_PREFIX));
        assert_eq!((encoded.width, encoded.height), (4, 3));
        assert_eq!((encoded.original_width, encoded.original_height), (4, 3));

        let decoded = decode_data_url(&encoded.data_url).expect("decode");
        assert_eq!(decoded, raw);
    }

    #[test]
    fn large_image_is_downscaled() {
        let encoded = normalize_image(&solid(1000, 500)).expect("normalize");
        assert_eq!((encoded.width, encoded.height), (800, 400));
        assert_eq!(encoded.original_width, 1000);
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let raw = RawImage { width: 10, height: 10, rgba: vec![0; 12] };
        assert!(normalize_image(&raw).is_err());
    }

    #[test]
    fn oversized_or_empty_images_are_rejected() {
        assert!(validate_pixel_limits(10_000, 5_000).is_err());
        assert!(validate_pixel_limits(0, 10).is_err());
        assert!(validate_pixel_limits(800, 600).is_ok());
    }

    #[test]
    fn non_data_url_is_rejected() {
        assert!(decode_data_url("/tmp/picture.png").is_err());
        assert!(decode_data_url("data:image/png;base64,@@@").is_err());
    }
}
