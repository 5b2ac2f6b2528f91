use super::error::BuildError;

/// Parameters controlling how far a quadtree subdivides.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildConfig {
	/// Quadrants at this depth are never split.
	pub max_depth: u32,
	/// Quadrants with a detail at or below this value are never split.
	pub detail_threshold: f64,
	/// Children of quadrants shallower than this are built in parallel;
	/// deeper quadrants recurse sequentially on the current worker.
	pub parallel_depth: u32,
	/// Worker count for a dedicated pool; `None` uses rayon's global pool.
	pub threads: Option<usize>,
}

impl Default for BuildConfig {
	fn default() -> Self {
		BuildConfig {
			max_depth: 8,
			detail_threshold: 13.,
			parallel_depth: 3,
			threads: None,
		}
	}
}

impl BuildConfig {
	/// Sets the deepest level a region may be split to.
	pub fn with_max_depth(mut self, max_depth: u32) -> Self {
		self.max_depth = max_depth;
		self
	}

	/// Sets the detail at or below which a region stays a leaf.
	pub fn with_detail_threshold(mut self, detail_threshold: f64) -> Self {
		self.detail_threshold = detail_threshold;
		self
	}

	/// Sets the depth from which subtrees are built sequentially.
	pub fn with_parallel_depth(mut self, parallel_depth: u32) -> Self {
		self.parallel_depth = parallel_depth;
		self
	}

	/// Runs builds on a dedicated pool of `threads` workers, or on the
	/// global rayon pool for `None`.
	pub fn with_threads(mut self, threads: Option<usize>) -> Self {
		self.threads = threads;
		self
	}

	/// Rejects values that would make a build meaningless.
	pub fn validate(&self) -> Result<(), BuildError> {
		if self.detail_threshold.is_nan() || self.detail_threshold < 0. {
			return Err(BuildError::InvalidConfig(format!(
				"detail threshold must be a non-negative number, got {}",
				self.detail_threshold
			)));
		}
		if self.threads == Some(0) {
			return Err(BuildError::InvalidConfig("thread count must be at least 1".into()));
		}
		Ok(())
	}
}

/// Parameters for GIF export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GifOptions {
	/// Display time of each frame in milliseconds.
	pub duration_ms: u32,
	/// Number of repetitions; 0 loops forever.
	pub loop_count: u16,
	/// Outline every quadrant in black.
	pub lines: bool,
}

impl Default for GifOptions {
	fn default() -> Self {
		GifOptions { duration_ms: 1000, loop_count: 0, lines: false }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_valid() {
		assert!(BuildConfig::default().validate().is_ok());
	}

	#[test]
	fn rejects_bad_threshold() {
		let nan = BuildConfig::default().with_detail_threshold(f64::NAN);
		assert!(matches!(nan.validate(), Err(BuildError::InvalidConfig(_))));
		let negative = BuildConfig::default().with_detail_threshold(-1.);
		assert!(matches!(negative.validate(), Err(BuildError::InvalidConfig(_))));
	}

	#[test]
	fn rejects_empty_pool() {
		let cfg = BuildConfig::default().with_threads(Some(0));
		assert!(matches!(cfg.validate(), Err(BuildError::InvalidConfig(_))));
	}
}
