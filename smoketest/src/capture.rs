use anyhow::{Context, Result, bail};
use xcap::image::EncodableLayout;

/// A source of full-screen frames.
pub trait Screen {
	fn capture(&self) -> Result<vision::OwnedImage>;
}

/// Captures a single monitor via `xcap`.
pub struct MonitorScreen {
	monitor: xcap::Monitor,
	name: String,
}

impl MonitorScreen {
	/// Pick the monitor named `wanted`, else the primary one, else the first.
	///
	/// Fails if the display subsystem cannot enumerate any monitor.
	pub fn open(wanted: Option<&str>) -> Result<Self> {
		let monitors = xcap::Monitor::all().context("enumerate monitors")?;
		if monitors.is_empty() {
			bail!("no monitors detected");
		}

		let named = wanted.and_then(|wanted| {
			monitors
				.iter()
				.position(|m| m.name().ok().as_deref() == Some(wanted))
		});
		if let Some(wanted) = wanted
			&& named.is_none()
		{
			tracing::warn!(monitor = wanted, "configured monitor not found; using primary");
		}

		let index = named
			.or_else(|| monitors.iter().position(|m| m.is_primary().unwrap_or(false)))
			.unwrap_or(0);
		let monitor = monitors.into_iter().nth(index).context("monitor vanished")?;
		let name = monitor.name().unwrap_or_else(|_| format!("monitor #{index}"));
		tracing::debug!(monitor = %name, "selected monitor");

		Ok(Self { monitor, name })
	}
}

impl Screen for MonitorScreen {
	fn capture(&self) -> Result<vision::OwnedImage> {
		let img = self
			.monitor
			.capture_image()
			.with_context(|| format!("capture {}", self.name))?;
		Ok(vision::OwnedImage::from_rgba(img.width() as usize, img.as_bytes()))
	}
}
