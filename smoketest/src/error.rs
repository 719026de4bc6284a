use std::path::PathBuf;

use thiserror::Error;

/// Failures that stop the harness before any probe runs.
#[derive(Error, Debug)]
pub enum HarnessError {
	#[error("templates directory not found: {}", .0.display())]
	TemplatesDirMissing(PathBuf),

	#[error("failed to register template '{name}' from {}: {reason:#}", .path.display())]
	Register {
		name: String,
		path: PathBuf,
		reason: anyhow::Error,
	},

	#[error("automation backend unavailable: {0:#}")]
	Automation(anyhow::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}
