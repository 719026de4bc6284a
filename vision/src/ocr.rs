//! OCR wrapper.
//!
//! Thin layer over `ocr-rs` (Rust PaddleOCR bindings). Screens are passed in
//! whole; the engine's detection stage finds the text lines itself.

use std::path::Path;

use anyhow::{Context, Result};

use crate::Image;

pub struct Ocr {
    engine: ocr_rs::OcrEngine,
}

impl Ocr {
    /// Initialize the OCR engine with the given model paths.
    pub fn try_new(
        detection: impl AsRef<Path>,
        recognition: impl AsRef<Path>,
        charset: impl AsRef<Path>,
    ) -> Result<Self> {
        let thread_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let engine = ocr_rs::OcrEngine::new(
            detection,
            recognition,
            charset,
            Some(ocr_rs::OcrEngineConfig {
                backend: ocr_rs::Backend::CPU,
                thread_count: thread_count as i32,
                precision_mode: ocr_rs::PrecisionMode::High,
                enable_parallel: thread_count > 1,
                min_result_confidence: 0.5,
                ..Default::default()
            }),
        )
        .context("failed to initialize OCR engine")?;

        Ok(Self { engine })
    }

    /// Recognize the text lines visible in an RGB image view.
    pub fn recognize(&self, image: Image) -> Result<Vec<String>> {
        let image = ocr_rs::preprocess::rgb_to_image(&image.get_bytes(), image.width(), image.height());

        let results = self.engine.recognize(&image).context("OCR recognition failed")?;
        Ok(results
            .into_iter()
            .map(|v| v.text)
            .filter(|text| !text.trim().is_empty())
            .collect())
    }
}
