#![allow(dead_code)]

use std::fs;
use std::path::Path;

use boxsight::{EncodedImage, VisionApi, VisionError};
use image::{ImageFormat, Rgb, RgbImage};

pub const GRAY: Rgb<u8> = Rgb([128, 128, 128]);

pub fn write_image(path: &Path, width: u32, height: u32, format: ImageFormat) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    RgbImage::from_pixel(width, height, GRAY)
        .save_with_format(path, format)
        .expect("write image file");
}

pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    write_image(path, width, height, ImageFormat::Jpeg);
}

pub fn write_png(path: &Path, width: u32, height: u32) {
    write_image(path, width, height, ImageFormat::Png);
}

/// A vision API that always answers with `text`.
pub fn answering(text: &'static str) -> Box<dyn VisionApi> {
    Box::new(move |_: &EncodedImage, _: &str| -> Result<String, VisionError> {
        Ok(text.to_string())
    })
}
