//! Screen inspection primitives: template matching and OCR text search.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Result};

mod image;
pub use self::image::*;
mod ocr;
pub use ocr::Ocr;
mod template;
pub use template::Template;
pub mod text;

/// Axis-aligned rectangle in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A successful detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Similarity score; compared against the caller's matching threshold.
    pub score: f32,
    /// Where the match sits on screen. OCR hits carry no region.
    pub region: Option<Region>,
}

/// Named template registry plus the OCR engine, or why it failed to load.
pub struct Vision {
    templates: HashMap<String, Template>,
    ocr: Result<Ocr, String>,
}

impl Vision {
    /// A failed OCR load is kept; text searches report it until then.
    pub fn new(ocr: Result<Ocr>) -> Self {
        Self {
            templates: HashMap::new(),
            ocr: ocr.map_err(|err| format!("{err:#}")),
        }
    }

    /// The OCR engine, or an error saying why it is unavailable.
    pub fn ocr(&self) -> Result<&Ocr> {
        self.ocr
            .as_ref()
            .map_err(|reason| anyhow!("OCR engine unavailable: {reason}"))
    }

    /// Decode `path` and register it under `name`, replacing any previous entry.
    pub fn add_template(&mut self, name: impl Into<String>, path: impl AsRef<Path>) -> Result<()> {
        let template = Template::open(path)?;
        self.templates.insert(name.into(), template);
        Ok(())
    }

    pub fn template(&self, name: &str) -> Result<&Template> {
        match self.templates.get(name) {
            Some(template) => Ok(template),
            None => bail!("no template registered under '{name}'"),
        }
    }

    /// Best match of the named template on `screen`, ignoring any threshold.
    pub fn best_template_match(&self, name: &str, screen: Image) -> Result<Option<Match>> {
        self.template(name)?.best_match(screen)
    }

    /// Best OCR similarity for `text` on `screen`.
    pub fn best_text_match(&self, text: &str, screen: Image) -> Result<Match> {
        let lines = self.ocr()?.recognize(screen)?;
        Ok(Match {
            score: text::best_similarity(text, &lines),
            region: None,
        })
    }
}
