//! The smoke-test harness: load the template manifest, then probe screenshot
//! capture, template detection and OCR detection against the live screen.
//!
//! Every probe item is isolated: an engine error is reported on the console
//! and the next item runs. Only a missing templates directory or a failed
//! construction stops the run early.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::automation::Automation;
use crate::error::HarnessError;
use crate::report::{LoadEntry, LoadReport, LoadStatus, Probe, ProbeOutcome, ProbeReport, RunSummary};

/// A template the harness expects to find on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestEntry {
	pub name: &'static str,
	pub file: &'static str,
}

pub const MANIFEST: [ManifestEntry; 5] = [
	ManifestEntry { name: "textedit_window", file: "textedit_window.png" },
	ManifestEntry { name: "save_dialog", file: "save_dialog.png" },
	ManifestEntry { name: "save_button", file: "save_button.png" },
	ManifestEntry { name: "use_both_extensions", file: "use_both_extensions.png" },
	ManifestEntry { name: "use_both_extensions_button", file: "use_both_extensions_button.png" },
];

pub const TEMPLATE_PROBES: [&str; 5] = [
	"textedit_window",
	"save_dialog",
	"save_button",
	"use_both_extensions",
	"use_both_extensions_button",
];

pub const TEXT_PROBES: [&str; 4] = ["File", "Edit", "View", "Window"];

pub const TEMPLATE_MATCHING: f32 = 0.7;
pub const TEXT_MATCHING: f32 = 0.8;
pub const WAITING_TIME: Duration = Duration::from_millis(1000);

const RULE: &str = "========================================";

pub struct Harness<A> {
	automation: A,
	templates_dir: PathBuf,
	load: LoadReport,
}

impl<A: Automation> Harness<A> {
	/// Check the templates directory and register every manifest file present in it.
	pub fn new(mut automation: A, templates_dir: impl Into<PathBuf>, out: &mut impl Write) -> Result<Self, HarnessError> {
		let templates_dir = templates_dir.into();
		if !templates_dir.is_dir() {
			return Err(HarnessError::TemplatesDirMissing(templates_dir));
		}

		let load = load_templates(&mut automation, &templates_dir, out)?;
		print_load_summary(&load, out)?;

		Ok(Self {
			automation,
			templates_dir,
			load,
		})
	}

	pub fn load_report(&self) -> &LoadReport {
		&self.load
	}

	pub fn probe_screenshot(&mut self, out: &mut impl Write) -> std::io::Result<ProbeReport> {
		let mut report = ProbeReport::new(Probe::Screenshot);
		writeln!(out, "\n📸 Testing screenshot capability...")?;

		match self.automation.get_screenshot() {
			Ok(path) => {
				writeln!(out, "✅ Screenshot taken: {}", path.display())?;
				report.push("display", ProbeOutcome::Found);
				report.artifact = Some(path);
			}
			Err(err) => {
				tracing::warn!(error = %err, "screenshot failed");
				writeln!(out, "❌ Screenshot failed: {err:#}")?;
				report.push("display", ProbeOutcome::Errored(format!("{err:#}")));
			}
		}
		Ok(report)
	}

	pub fn probe_templates(&mut self, out: &mut impl Write) -> std::io::Result<ProbeReport> {
		let mut report = ProbeReport::new(Probe::Template);
		writeln!(out, "\n🔍 Testing template detection on current screen...")?;
		writeln!(out, "   (Note: Templates may not be found if apps aren't open)")?;

		for name in TEMPLATE_PROBES {
			writeln!(out, "   Looking for {name}...")?;
			let outcome = match self.automation.find(name, TEMPLATE_MATCHING, WAITING_TIME) {
				Ok(Some(hit)) => {
					tracing::debug!(name, score = hit.score, region = ?hit.region, "template found");
					writeln!(out, "   ✅ Found: {name}")?;
					ProbeOutcome::Found
				}
				Ok(None) => {
					writeln!(out, "   ❌ Not found: {name} (expected if app not open)")?;
					ProbeOutcome::NotFound
				}
				Err(err) => {
					tracing::warn!(name, error = %err, "template detection failed");
					writeln!(out, "   ❌ Error testing {name}: {err:#}")?;
					ProbeOutcome::Errored(format!("{err:#}"))
				}
			};
			report.push(name, outcome);
		}
		Ok(report)
	}

	pub fn probe_text(&mut self, out: &mut impl Write) -> std::io::Result<ProbeReport> {
		let mut report = ProbeReport::new(Probe::Text);
		writeln!(out, "\n📝 Testing OCR functionality...")?;

		for text in TEXT_PROBES {
			let outcome = match self.automation.find_text(text, TEXT_MATCHING, WAITING_TIME) {
				Ok(Some(hit)) => {
					tracing::debug!(text, score = hit.score, "text found");
					writeln!(out, "   ✅ Found text: '{text}'")?;
					ProbeOutcome::Found
				}
				Ok(None) => ProbeOutcome::NotFound,
				Err(err) => {
					tracing::warn!(text, error = %err, "text detection failed");
					writeln!(out, "   ❌ Error looking for '{text}': {err:#}")?;
					ProbeOutcome::Errored(format!("{err:#}"))
				}
			};
			report.push(text, outcome);
		}

		match report.found_count() {
			0 => writeln!(out, "   ⚠️  No text found (OCR may need adjustment or no text visible)")?,
			n => writeln!(out, "   📊 OCR working - found {n} text elements")?,
		}
		Ok(report)
	}

	pub fn print_summary(&self, out: &mut impl Write) -> std::io::Result<()> {
		writeln!(out, "\n{RULE}")?;
		writeln!(out, "🎯 Test Complete!")?;
		writeln!(out, "\n💡 Next Steps:")?;
		writeln!(out, "   1. Ensure all templates exist in {}", self.templates_dir.display())?;
		writeln!(out, "   2. Open the target app (TextEdit) and run: rpa-smoketest")?;
		writeln!(out, "   3. Re-run with RUST_LOG=debug to see match scores")?;
		writeln!(out, "\n🎤 Capabilities exercised:")?;
		writeln!(out, "   ✅ Template-based UI detection")?;
		writeln!(out, "   ✅ OCR text recognition")?;
		writeln!(out, "   ✅ Screenshot evidence collection")?;
		writeln!(out, "   ✅ Per-probe error isolation")?;
		Ok(())
	}
}

/// Register every manifest file that exists under `dir`.
///
/// The result depends only on which files exist, so repeated calls agree.
/// Register every manifest file present in `dir`, reporting each one as it goes.
///
/// A file that exists but cannot be registered aborts the load; the lines
/// for the files before it have already been written.
pub fn load_templates(
	automation: &mut impl Automation,
	dir: &Path,
	out: &mut impl Write,
) -> Result<LoadReport, HarnessError> {
	let mut report = LoadReport::default();
	for entry in MANIFEST {
		let path = dir.join(entry.file);
		let status = if path.is_file() {
			automation
				.add_image(entry.name, &path)
				.map_err(|reason| HarnessError::Register {
					name: entry.name.to_string(),
					path: path.clone(),
					reason,
				})?;
			writeln!(out, "✅ Loaded template: {}", entry.name)?;
			LoadStatus::Loaded
		} else {
			writeln!(out, "❌ Missing template: {}", entry.file)?;
			LoadStatus::Missing
		};
		tracing::debug!(name = entry.name, ?path, ?status, "template load");
		report.entries.push(LoadEntry {
			name: entry.name,
			path,
			status,
		});
	}
	Ok(report)
}

fn print_load_summary(load: &LoadReport, out: &mut impl Write) -> std::io::Result<()> {
	writeln!(out, "\n📊 Template Summary:")?;
	writeln!(out, "   ✅ Loaded: {}", load.loaded_count())?;
	writeln!(out, "   ❌ Missing: {}", load.missing_count())?;

	if load.missing_count() > 0 {
		writeln!(out, "\n💡 Create these template images:")?;
		for entry in load.missing() {
			writeln!(out, "   - {}", entry.path.display())?;
		}
	}
	Ok(())
}

/// Construct the automation backend and the harness, then run every probe.
///
/// Returns `None` when the run was aborted before probing; the reason has
/// already been written to `out`. Only console write failures are errors.
pub fn run<A: Automation>(
	construct: impl FnOnce() -> anyhow::Result<A>,
	templates_dir: &Path,
	out: &mut impl Write,
) -> anyhow::Result<Option<RunSummary>> {
	writeln!(out, "🧪 RPA Template Smoke Test")?;
	writeln!(out, "{RULE}")?;

	let harness = construct()
		.map_err(HarnessError::Automation)
		.and_then(|automation| Harness::new(automation, templates_dir, &mut *out));
	let mut harness = match harness {
		Ok(harness) => harness,
		Err(HarnessError::Io(err)) => return Err(err.into()),
		Err(err) => {
			tracing::error!(error = %err, "harness construction failed");
			writeln!(out, "❌ Failed to create test bot: {err}")?;
			if let HarnessError::TemplatesDirMissing(dir) = &err {
				writeln!(out, "\n💡 Create {} with these template images:", dir.display())?;
				for entry in MANIFEST {
					writeln!(out, "   - {}", entry.file)?;
				}
			}
			return Ok(None);
		}
	};
	writeln!(out, "✅ Test bot created successfully")?;

	writeln!(out, "\n🏃 Running Tests...")?;
	let screenshot = harness.probe_screenshot(out)?;
	let templates = harness.probe_templates(out)?;
	let text = harness.probe_text(out)?;

	for report in [&screenshot, &templates, &text] {
		tracing::info!(
			probe = %report.probe,
			found = report.found_count(),
			errored = ?report.errored_targets(),
			attempted = report.items.len(),
			"probe finished"
		);
	}

	harness.print_summary(out)?;

	Ok(Some(RunSummary {
		load: harness.load_report().clone(),
		screenshot,
		templates,
		text,
	}))
}
