use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

pub const TEMPLATES_DIR_NAME: &str = "templates";
pub const ASSETS_DIR_ENV: &str = "RPA_SMOKETEST_ASSETS_DIR";

#[derive(Debug, Clone)]
pub struct OcrAssets {
	pub detection: PathBuf,
	pub recognition: PathBuf,
	pub charset: PathBuf,
}

/// Directories that may hold `templates/` and `ocr/`, in priority order:
/// - next to the executable (packaged binary),
/// - the current directory,
/// - the workspace root (debug builds, so `cargo run` works from anywhere).
fn base_candidates() -> Vec<PathBuf> {
	let mut candidates: Vec<PathBuf> = Vec::new();
	if let Ok(exe) = std::env::current_exe()
		&& let Some(dir) = exe.parent()
	{
		candidates.push(dir.to_path_buf());
	}
	if let Ok(cwd) = std::env::current_dir() {
		candidates.push(cwd);
	}
	#[cfg(debug_assertions)]
	candidates.push(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".."));
	candidates
}

/// First candidate that contains a `templates/` directory.
pub fn find_templates_dir(candidates: &[PathBuf]) -> Option<PathBuf> {
	candidates
		.iter()
		.map(|base| base.join(TEMPLATES_DIR_NAME))
		.find(|dir| dir.is_dir())
}

/// Resolve the templates directory.
///
/// Never fails: when nothing is found the path next to the executable is
/// returned, so the caller can report exactly where the directory was expected.
pub fn resolve_templates_dir(configured: Option<&Path>) -> PathBuf {
	if let Some(dir) = configured {
		return dir.to_path_buf();
	}
	let candidates = base_candidates();
	find_templates_dir(&candidates).unwrap_or_else(|| {
		candidates
			.first()
			.cloned()
			.unwrap_or_default()
			.join(TEMPLATES_DIR_NAME)
	})
}

fn normalize_ocr_dir(dir: PathBuf) -> PathBuf {
	// Allow the env var to point either to the app root (containing `ocr/`)
	// or directly to the `ocr/` folder.
	if dir.join("detection.mnn").is_file() {
		dir
	} else {
		dir.join("ocr")
	}
}

/// Look for the OCR model files under each of `candidates`.
pub fn find_ocr_assets(candidates: Vec<PathBuf>, lang_code: &str) -> Result<OcrAssets> {
	let recognition_name = format!("{lang_code}_recognition.mnn");
	let charset_name = format!("{lang_code}_charset.txt");

	let mut tried = Vec::new();
	for base in candidates {
		let ocr_dir = normalize_ocr_dir(base);
		let detection = ocr_dir.join("detection.mnn");
		let recognition = ocr_dir.join(&recognition_name);
		let charset = ocr_dir.join(&charset_name);

		if detection.is_file() && recognition.is_file() && charset.is_file() {
			return Ok(OcrAssets { detection, recognition, charset });
		}

		tried.push(ocr_dir);
	}

	bail!(
		"OCR model files not found. Expected these files:\n  - ocr/detection.mnn\n  - ocr/{recognition_name}\n  - ocr/{charset_name}\n\nSearched in:\n{}\n\nFix: copy the 'ocr/' folder next to the executable (or set {ASSETS_DIR_ENV} to the folder that contains it).",
		tried
			.into_iter()
			.map(|p| format!("  - {}", p.display()))
			.collect::<Vec<_>>()
			.join("\n")
	)
}

/// Resolve OCR model paths. `RPA_SMOKETEST_ASSETS_DIR` is searched first.
pub fn resolve_ocr_assets(lang_code: &str) -> Result<OcrAssets> {
	let mut candidates = Vec::new();
	if let Some(dir) = std::env::var_os(ASSETS_DIR_ENV) {
		candidates.push(PathBuf::from(dir));
	}
	candidates.extend(base_candidates());
	find_ocr_assets(candidates, lang_code)
}
