//! In-memory results of a run. Nothing here is persisted.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
	/// File found and registered with the matching engine.
	Loaded,
	/// File absent from the templates directory.
	Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadEntry {
	pub name: &'static str,
	pub path: PathBuf,
	pub status: LoadStatus,
}

/// Per-template load results, in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
	pub entries: Vec<LoadEntry>,
}

impl LoadReport {
	pub fn loaded(&self) -> impl Iterator<Item = &LoadEntry> {
		self.entries.iter().filter(|e| e.status == LoadStatus::Loaded)
	}

	pub fn missing(&self) -> impl Iterator<Item = &LoadEntry> {
		self.entries.iter().filter(|e| e.status == LoadStatus::Missing)
	}

	pub fn loaded_count(&self) -> usize {
		self.loaded().count()
	}

	pub fn missing_count(&self) -> usize {
		self.missing().count()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
	Screenshot,
	Template,
	Text,
}

impl fmt::Display for Probe {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Probe::Screenshot => write!(f, "screenshot"),
			Probe::Template => write!(f, "template detection"),
			Probe::Text => write!(f, "OCR detection"),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
	Found,
	/// Legitimately not on screen. Not an error.
	NotFound,
	Errored(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeItem {
	/// Template name, searched text, or `display` for the screenshot.
	pub target: String,
	pub outcome: ProbeOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
	pub probe: Probe,
	pub items: Vec<ProbeItem>,
	/// File produced by the probe (screenshot only).
	pub artifact: Option<PathBuf>,
}

impl ProbeReport {
	pub fn new(probe: Probe) -> Self {
		Self {
			probe,
			items: Vec::new(),
			artifact: None,
		}
	}

	pub fn push(&mut self, target: impl Into<String>, outcome: ProbeOutcome) {
		self.items.push(ProbeItem {
			target: target.into(),
			outcome,
		});
	}

	#[cfg(test)]
	pub fn outcome(&self, target: &str) -> Option<&ProbeOutcome> {
		self.items.iter().find(|i| i.target == target).map(|i| &i.outcome)
	}

	pub fn found_count(&self) -> usize {
		self.items.iter().filter(|i| i.outcome == ProbeOutcome::Found).count()
	}

	/// Targets whose attempt raised an engine error.
	pub fn errored_targets(&self) -> Vec<&str> {
		self.items
			.iter()
			.filter(|i| matches!(i.outcome, ProbeOutcome::Errored(_)))
			.map(|i| i.target.as_str())
			.collect()
	}

	/// True when every attempted item was found.
	pub fn passed(&self) -> bool {
		!self.items.is_empty() && self.found_count() == self.items.len()
	}
}

/// Everything a completed run observed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
	pub load: LoadReport,
	pub screenshot: ProbeReport,
	pub templates: ProbeReport,
	pub text: ProbeReport,
}
