//! Image OCR extractor (§4.3).
//!
//! Probes pixel dimensions before doing any decode work; skips OCR
//! entirely if `width * height` exceeds `maxImagePixelCountForOCR`.
//! Otherwise downscales to `min(maxImageDimensionForOCR, 2048)` on the
//! longest edge and runs `rusty-tesseract` against the (possibly
//! downscaled) buffer.

use std::path::Path;

#[derive(Debug)]
pub struct ImageOcrResult {
    pub text: String,
    pub was_ocr_used: bool,
    pub warnings: Vec<&'static str>,
}

#[derive(Debug)]
pub struct ImageOcrError(pub String);

impl std::fmt::Display for ImageOcrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "image OCR failed: {}", self.0)
    }
}
impl std::error::Error for ImageOcrError {}

const HARD_DIMENSION_CAP: u32 = 2048;

pub fn extract_image_text(
    path: &Path,
    max_pixel_count: u64,
    max_dimension: u32,
) -> Result<ImageOcrResult, ImageOcrError> {
    let dims = image::image_dimensions(path).map_err(|e| ImageOcrError(e.to_string()))?;
    let (width, height) = dims;
    let pixel_count = width as u64 * height as u64;

    if pixel_count > max_pixel_count {
        return Ok(ImageOcrResult {
            text: String::new(),
            was_ocr_used: false,
            warnings: vec!["image_too_large_for_ocr"],
        });
    }

    let img = image::open(path).map_err(|e| ImageOcrError(e.to_string()))?;
    let effective_cap = max_dimension.min(HARD_DIMENSION_CAP);
    let longest_edge = width.max(height);
    let scaled = if longest_edge > effective_cap {
        img.resize(effective_cap, effective_cap, image::imageops::FilterType::Triangle)
    } else {
        img
    };

    let tmp_path = std::env::temp_dir().join(format!("ocr-{}.png", uuid::Uuid::new_v4()));
    scaled
        .save(&tmp_path)
        .map_err(|e| ImageOcrError(e.to_string()))?;

    let image_args = rusty_tesseract::Args::default();
    let ocr_image = rusty_tesseract::Image::from_path(&tmp_path)
        .map_err(|e| ImageOcrError(e.to_string()))?;
    let text = rusty_tesseract::image_to_string(&ocr_image, &image_args)
        .map_err(|e| ImageOcrError(e.to_string()))?;

    let _ = std::fs::remove_file(&tmp_path);

    Ok(ImageOcrResult {
        text,
        was_ocr_used: true,
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonexistent_path_returns_error() {
        let result = extract_image_text(Path::new("/does/not/exist.png"), 10_000_000, 2048);
        assert!(result.is_err());
    }

    #[test]
    fn oversized_pixel_count_skips_without_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tiny.png");
        let img = image::RgbImage::new(4, 4);
        img.save(&path).unwrap();
        let result = extract_image_text(&path, 1, 2048).unwrap();
        assert!(!result.was_ocr_used);
        assert_eq!(result.warnings, vec!["image_too_large_for_ocr"]);
    }
}
