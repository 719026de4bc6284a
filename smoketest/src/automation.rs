//! The automation capabilities the harness exercises, and the desktop
//! adapter that provides them.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use vision::{Image, Match, Ocr, Vision};

use crate::capture::{MonitorScreen, Screen};
use crate::config::Config;
use crate::util::assets;

/// Screen automation operations.
///
/// `find` and `find_text` distinguish an expected absence (`Ok(None)`) from an
/// engine failure (`Err`).
pub trait Automation {
	/// Register the image at `path` under `name` for later matching.
	fn add_image(&mut self, name: &str, path: &Path) -> Result<()>;

	/// Capture the display to a file and return its path.
	fn get_screenshot(&mut self) -> Result<PathBuf>;

	/// Search the screen for the template registered as `name`, polling up to `waiting_time`.
	fn find(&mut self, name: &str, matching: f32, waiting_time: Duration) -> Result<Option<Match>>;

	/// Search the screen for the literal `text` via OCR, polling up to `waiting_time`.
	fn find_text(&mut self, text: &str, matching: f32, waiting_time: Duration) -> Result<Option<Match>>;
}

/// [`Automation`] over a live screen, the template matcher and the OCR engine.
pub struct DesktopAutomation<S = MonitorScreen> {
	screen: S,
	vision: Vision,
	screenshot_dir: PathBuf,
	poll_interval: Duration,
}

impl DesktopAutomation<MonitorScreen> {
	/// Open the configured monitor and load the OCR models.
	///
	/// Missing OCR models do not fail construction; they surface as errors
	/// from every `find_text` call instead.
	pub fn from_config(cfg: &Config) -> Result<Self> {
		let screen = MonitorScreen::open(cfg.monitor.as_deref()).context("initialize screen capture")?;

		let ocr = assets::resolve_ocr_assets(&cfg.ocr_language)
			.and_then(|a| Ocr::try_new(&a.detection, &a.recognition, &a.charset));
		if let Err(err) = &ocr {
			tracing::warn!(error = %err, "OCR unavailable; text probes will fail");
		}

		Ok(Self::new(screen, ocr, cfg.screenshot_dir(), cfg.poll_interval()))
	}
}

impl<S: Screen> DesktopAutomation<S> {
	pub fn new(screen: S, ocr: Result<Ocr>, screenshot_dir: PathBuf, poll_interval: Duration) -> Self {
		Self {
			screen,
			vision: Vision::new(ocr),
			screenshot_dir,
			poll_interval,
		}
	}

	/// Capture and run `attempt` until it yields a hit or `waiting_time` runs out.
	///
	/// At least one attempt is always made. Capture failures end the poll.
	fn poll(
		&self,
		waiting_time: Duration,
		mut attempt: impl FnMut(Image) -> Result<Option<Match>>,
	) -> Result<Option<Match>> {
		let deadline = Instant::now() + waiting_time;
		let mut attempts = 0u32;
		loop {
			let frame = self.screen.capture()?;
			attempts += 1;
			if let Some(hit) = attempt(frame.as_image())? {
				tracing::debug!(attempts, score = hit.score, "detection hit");
				return Ok(Some(hit));
			}

			let now = Instant::now();
			if now >= deadline {
				tracing::debug!(attempts, "detection timed out");
				return Ok(None);
			}
			std::thread::sleep(self.poll_interval.min(deadline - now));
		}
	}
}

impl<S: Screen> Automation for DesktopAutomation<S> {
	fn add_image(&mut self, name: &str, path: &Path) -> Result<()> {
		self.vision
			.add_template(name, path)
			.with_context(|| format!("register template '{name}'"))?;
		tracing::debug!(name, ?path, "registered template");
		Ok(())
	}

	fn get_screenshot(&mut self) -> Result<PathBuf> {
		let frame = self.screen.capture()?;

		std::fs::create_dir_all(&self.screenshot_dir)
			.with_context(|| format!("create {:?}", self.screenshot_dir))?;
		let millis = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|d| d.as_millis())
			.unwrap_or_default();
		let path = self.screenshot_dir.join(format!("screenshot-{millis}.png"));

		frame.as_image().save_png(&path)?;
		tracing::debug!(?path, "saved screenshot");
		Ok(path)
	}

	fn find(&mut self, name: &str, matching: f32, waiting_time: Duration) -> Result<Option<Match>> {
		// Unknown names are an error, not an absence.
		self.vision.template(name)?;

		self.poll(waiting_time, |screen| {
			let best = self.vision.best_template_match(name, screen)?;
			tracing::debug!(name, score = best.map(|m| m.score), matching, "template attempt");
			Ok(best.filter(|m| m.score >= matching))
		})
	}

	fn find_text(&mut self, text: &str, matching: f32, waiting_time: Duration) -> Result<Option<Match>> {
		// Missing OCR is an error for every call, checked before any capture.
		self.vision.ocr()?;

		self.poll(waiting_time, |screen| {
			let best = self.vision.best_text_match(text, screen)?;
			tracing::debug!(text, score = best.score, matching, "text attempt");
			Ok(Some(best).filter(|m| m.score >= matching))
		})
	}
}

#[cfg(test)]
mod tests {
	use std::cell::{Cell, RefCell};
	use std::collections::VecDeque;

	use vision::{Color, OwnedImage, Region};

	use super::*;

	/// Replays frames in order; the last one repeats. `None` frames fail.
	struct Frames {
		frames: RefCell<VecDeque<Option<OwnedImage>>>,
		captures: Cell<u32>,
	}

	impl Frames {
		fn new(frames: Vec<Option<OwnedImage>>) -> Self {
			Self {
				frames: RefCell::new(frames.into()),
				captures: Cell::new(0),
			}
		}
	}

	impl Screen for &Frames {
		fn capture(&self) -> Result<OwnedImage> {
			self.captures.set(self.captures.get() + 1);
			let mut frames = self.frames.borrow_mut();
			let frame = if frames.len() > 1 {
				frames.pop_front().flatten()
			} else {
				frames.front().cloned().flatten()
			};
			frame.context("display went away")
		}
	}

	fn checker(width: u32, height: u32) -> OwnedImage {
		OwnedImage::from_fn(width, height, |x, y| {
			let h = (x.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA77)).wrapping_mul(0x2C1B_3C6D);
			Color::gray((h >> 24) as u8)
		})
	}

	fn blank() -> OwnedImage {
		OwnedImage::from_fn(100, 60, |_, _| Color::gray(30))
	}

	fn adapter<'a>(frames: &'a Frames, dir: &Path) -> DesktopAutomation<&'a Frames> {
		DesktopAutomation::new(
			frames,
			Err(anyhow::anyhow!("models missing")),
			dir.join("shots"),
			Duration::from_millis(1),
		)
	}

	/// A screen with a distinctive patch at (40, 20) and that patch saved as a template.
	fn screen_with_button(dir: &Path) -> (OwnedImage, PathBuf) {
		let screen = checker(100, 60);
		let path = dir.join("button.png");
		screen.as_image().sub_image(40, 20, 18, 16).save_png(&path).unwrap();
		(screen, path)
	}

	#[test]
	fn find_polls_until_template_appears() {
		let dir = tempfile::tempdir().unwrap();
		let (screen, path) = screen_with_button(dir.path());
		let frames = Frames::new(vec![Some(blank()), Some(blank()), Some(screen)]);
		let mut bot = adapter(&frames, dir.path());
		bot.add_image("button", &path).unwrap();

		let hit = bot.find("button", 0.7, Duration::from_secs(5)).unwrap().unwrap();
		assert_eq!(
			hit.region,
			Some(Region {
				x: 40,
				y: 20,
				width: 18,
				height: 16
			})
		);
		assert_eq!(frames.captures.get(), 3);
	}

	#[test]
	fn find_gives_up_after_waiting_time() {
		let dir = tempfile::tempdir().unwrap();
		let (_, path) = screen_with_button(dir.path());
		let frames = Frames::new(vec![Some(blank())]);
		let mut bot = adapter(&frames, dir.path());
		bot.add_image("button", &path).unwrap();

		let start = Instant::now();
		assert_eq!(bot.find("button", 0.7, Duration::from_millis(30)).unwrap(), None);
		assert!(start.elapsed() >= Duration::from_millis(30));
		assert!(frames.captures.get() >= 2);
	}

	#[test]
	fn zero_wait_still_attempts_once() {
		let dir = tempfile::tempdir().unwrap();
		let (_, path) = screen_with_button(dir.path());
		let frames = Frames::new(vec![Some(blank())]);
		let mut bot = adapter(&frames, dir.path());
		bot.add_image("button", &path).unwrap();

		assert_eq!(bot.find("button", 0.7, Duration::ZERO).unwrap(), None);
		assert_eq!(frames.captures.get(), 1);
	}

	#[test]
	fn unknown_template_errors_without_capturing() {
		let dir = tempfile::tempdir().unwrap();
		let frames = Frames::new(vec![Some(blank())]);
		let mut bot = adapter(&frames, dir.path());

		assert!(bot.find("save_dialog", 0.7, Duration::ZERO).is_err());
		assert_eq!(frames.captures.get(), 0);
	}

	#[test]
	fn capture_failure_is_an_error_not_an_absence() {
		let dir = tempfile::tempdir().unwrap();
		let (_, path) = screen_with_button(dir.path());
		let frames = Frames::new(vec![None]);
		let mut bot = adapter(&frames, dir.path());
		bot.add_image("button", &path).unwrap();

		let err = bot.find("button", 0.7, Duration::from_millis(10)).unwrap_err();
		assert!(err.to_string().contains("display went away"));
	}

	#[test]
	fn find_text_reports_why_ocr_is_unavailable() {
		let dir = tempfile::tempdir().unwrap();
		let frames = Frames::new(vec![Some(blank())]);
		let mut bot = adapter(&frames, dir.path());

		let err = bot.find_text("File", 0.8, Duration::ZERO).unwrap_err();
		assert_eq!(err.to_string(), "OCR engine unavailable: models missing");
		assert_eq!(frames.captures.get(), 0);
	}

	#[test]
	fn add_image_rejects_missing_and_corrupt_files() {
		let dir = tempfile::tempdir().unwrap();
		let frames = Frames::new(vec![Some(blank())]);
		let mut bot = adapter(&frames, dir.path());

		assert!(bot.add_image("ghost", &dir.path().join("ghost.png")).is_err());

		let corrupt = dir.path().join("corrupt.png");
		std::fs::write(&corrupt, b"\x89PNG garbage").unwrap();
		assert!(bot.add_image("corrupt", &corrupt).is_err());
	}

	#[test]
	fn screenshot_is_written_as_png() {
		let dir = tempfile::tempdir().unwrap();
		let frames = Frames::new(vec![Some(checker(32, 24))]);
		let mut bot = adapter(&frames, dir.path());

		let path = bot.get_screenshot().unwrap();
		assert!(path.starts_with(dir.path().join("shots")));
		let saved = OwnedImage::open(&path).unwrap();
		assert_eq!((saved.width(), saved.height()), (32, 24));
	}

	#[test]
	fn screenshot_failure_propagates() {
		let dir = tempfile::tempdir().unwrap();
		let frames = Frames::new(vec![None]);
		let mut bot = adapter(&frames, dir.path());
		assert!(bot.get_screenshot().is_err());
	}
}
