//! RPA smoke test.
//!
//! Loads the template manifest and probes screenshot capture, template
//! detection and OCR on whatever is currently on screen.

mod automation;
mod capture;
mod config;
mod error;
mod harness;
mod report;
mod util;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
	// Structured logging. Use `RUST_LOG=debug` etc.; the console report is separate.
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
		.with_writer(std::io::stderr)
		.init();

	let cfg = config::Config::load_or_default();
	let templates_dir = util::assets::resolve_templates_dir(cfg.templates_dir.as_deref());
	tracing::debug!(?templates_dir, "resolved templates directory");

	let mut stdout = std::io::stdout().lock();
	let summary = harness::run(
		|| automation::DesktopAutomation::from_config(&cfg),
		&templates_dir,
		&mut stdout,
	)?;

	if let Some(summary) = summary {
		tracing::info!(
			loaded = summary.load.loaded_count(),
			missing = summary.load.missing_count(),
			screenshot = summary.screenshot.passed(),
			templates_found = summary.templates.found_count(),
			texts_found = summary.text.found_count(),
			"smoke test finished"
		);
	}
	Ok(())
}
