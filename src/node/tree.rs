use std::sync::atomic::{AtomicU32, Ordering};

use image::{DynamicImage, RgbImage};

use super::detail::Histogram;
use super::error::{BuildError, QueryError};
use super::{should_split, BBox, BuildConfig, Children, Quadrant};

/// A quadtree decomposition of one image.
///
/// Built once from the source pixels; read-only afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct QuadTree {
	width: u32,
	height: u32,
	root: Quadrant,
	max_depth: u32,
}

/// Shared state of one build. The source is only read; `deepest` is the
/// only value written from several branches.
struct Builder<'a> {
	source: &'a RgbImage,
	config: &'a BuildConfig,
	deepest: AtomicU32,
}

impl<'a> Builder<'a> {
	/// Measures `bbox`, then either finalizes it as a leaf or builds its
	/// four quarters. Quarters above `parallel_depth` are forked onto the
	/// pool; the call returns only after all of them have finished.
	fn grow(&self, bbox: BBox, depth: u32) -> Result<Quadrant, BuildError> {
		let hist = Histogram::of_region(self.source, bbox);
		let detail = hist.detail();
		let color = hist.mean_color();

		if !should_split(self.config, &bbox, depth, detail) {
			self.deepest.fetch_max(depth, Ordering::Relaxed);
			return Ok(Quadrant { bbox, depth, detail, color, children: Children::Leaf });
		}

		let [tl, tr, bl, br] = bbox.quarters().ok_or(BuildError::DegenerateRegion(bbox))?;
		let next = depth + 1;
		let sections = if depth < self.config.parallel_depth {
			let ((tl, tr), (bl, br)) = rayon::join(
				|| rayon::join(|| self.grow(tl, next), || self.grow(tr, next)),
				|| rayon::join(|| self.grow(bl, next), || self.grow(br, next)),
			);
			[tl?, tr?, bl?, br?]
		} else {
			[self.grow(tl, next)?, self.grow(tr, next)?, self.grow(bl, next)?, self.grow(br, next)?]
		};

		Ok(Quadrant { bbox, depth, detail, color, children: Children::Split(Box::new(sections)) })
	}
}

impl QuadTree {
	/// Decomposes `source` according to `config`.
	///
	/// Fails if the configuration is invalid, the image is empty, or any
	/// branch fails; no partial tree is ever returned.
	pub fn build(source: &RgbImage, config: &BuildConfig) -> Result<QuadTree, BuildError> {
		config.validate()?;
		let (width, height) = source.dimensions();
		if width == 0 || height == 0 {
			return Err(BuildError::EmptyImage { width, height });
		}

		let builder = Builder { source, config, deepest: AtomicU32::new(0) };
		let bbox = BBox::full(width, height);
		let root = match config.threads {
			Some(threads) => rayon::ThreadPoolBuilder::new()
				.num_threads(threads)
				.build()?
				.install(|| builder.grow(bbox, 0))?,
			None => builder.grow(bbox, 0)?,
		};
		let max_depth = builder.deepest.into_inner();

		tracing::debug!(
			width,
			height,
			max_depth,
			leaves = root.leaf_count(),
			"built quadtree"
		);
		Ok(QuadTree { width, height, root, max_depth })
	}

	/// Converts any decoded image to RGB and decomposes it.
	pub fn from_image(source: &DynamicImage, config: &BuildConfig) -> Result<QuadTree, BuildError> {
		QuadTree::build(&source.to_rgb8(), config)
	}

	/// Reassembles a tree whose nodes were produced elsewhere (e.g. decoded).
	pub(crate) fn from_parts(width: u32, height: u32, root: Quadrant, max_depth: u32) -> Self {
		QuadTree { width, height, root, max_depth }
	}

	/// Width of the source image.
	pub fn width(&self) -> u32 {
		self.width
	}

	/// Height of the source image.
	pub fn height(&self) -> u32 {
		self.height
	}

	/// The node covering the whole image.
	pub fn root(&self) -> &Quadrant {
		&self.root
	}

	/// Depth of the deepest leaf.
	pub fn max_depth(&self) -> u32 {
		self.max_depth
	}

	/// The quadrants visible when the tree is viewed at `depth`: every leaf
	/// no deeper than `depth`, plus every split node lying exactly at
	/// `depth`, which then stands in for its whole subtree.
	///
	/// Together they tile the image. Fails if `depth` is deeper than the
	/// deepest leaf.
	pub fn leaf_quadrants(&self, depth: u32) -> Result<Vec<&Quadrant>, QueryError> {
		if depth > self.max_depth {
			return Err(QueryError::InvalidDepth { requested: depth, max: self.max_depth });
		}
		Ok(self.view(depth))
	}

	/// `leaf_quadrants` without the depth check.
	pub(crate) fn view(&self, depth: u32) -> Vec<&Quadrant> {
		let mut found = Vec::new();
		collect_view(&self.root, depth, &mut found);
		found
	}
}

fn collect_view<'a>(quadrant: &'a Quadrant, depth: u32, found: &mut Vec<&'a Quadrant>) {
	match quadrant.children() {
		Some(sections) if quadrant.depth != depth => {
			for section in sections.iter() {
				collect_view(section, depth, found);
			}
		},
		_ => found.push(quadrant),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::Rgb;

	/// 4x4 image: left half black, right half white.
	fn halves() -> RgbImage {
		RgbImage::from_fn(4, 4, |x, _| if x < 2 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) })
	}

	#[test]
	fn uniform_image_is_single_leaf() {
		let img = RgbImage::from_pixel(64, 48, Rgb([12, 200, 7]));
		let tree = QuadTree::build(&img, &BuildConfig::default()).unwrap();
		assert!(tree.root().is_leaf());
		assert_eq!(tree.max_depth(), 0);
		assert_eq!(tree.root().color, Rgb([12, 200, 7]));
		assert_eq!(tree.root().detail, 0.);
	}

	#[test]
	fn splits_once_into_uniform_quarters() {
		let tree = QuadTree::build(&halves(), &BuildConfig::default()).unwrap();
		assert_eq!(tree.max_depth(), 1);
		let sections = tree.root().children().unwrap();
		let colors: Vec<_> = sections.iter().map(|s| s.color).collect();
		assert_eq!(colors, vec![
			Rgb([0, 0, 0]), Rgb([255, 255, 255]),
			Rgb([0, 0, 0]), Rgb([255, 255, 255]),
		]);
		assert!(sections.iter().all(|s| s.is_leaf() && s.depth == 1));
	}

	#[test]
	fn depth_limit_stops_splitting() {
		let cfg = BuildConfig::default().with_max_depth(0);
		let tree = QuadTree::build(&halves(), &cfg).unwrap();
		assert!(tree.root().is_leaf());
		assert_eq!(tree.max_depth(), 0);
	}

	#[test]
	fn single_pixel_is_never_split() {
		let img = RgbImage::from_pixel(1, 1, Rgb([1, 2, 3]));
		let cfg = BuildConfig::default().with_detail_threshold(0.);
		let tree = QuadTree::build(&img, &cfg).unwrap();
		assert!(tree.root().is_leaf());
	}

	#[test]
	fn thin_strip_stays_a_leaf() {
		let img = RgbImage::from_fn(9, 1, |x, _| Rgb([(x * 28) as u8, 0, 0]));
		let cfg = BuildConfig::default().with_detail_threshold(0.);
		let tree = QuadTree::build(&img, &cfg).unwrap();
		assert!(tree.root().is_leaf());
		assert!(tree.root().detail > 0.);
	}

	#[test]
	fn empty_image_is_rejected() {
		let img = RgbImage::new(0, 5);
		assert!(matches!(
			QuadTree::build(&img, &BuildConfig::default()),
			Err(BuildError::EmptyImage { width: 0, height: 5 })
		));
	}

	#[test]
	fn invalid_config_is_rejected() {
		let cfg = BuildConfig::default().with_threads(Some(0));
		assert!(matches!(QuadTree::build(&halves(), &cfg), Err(BuildError::InvalidConfig(_))));
	}

	#[test]
	fn dedicated_pool_matches_global_pool() {
		let img = RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, ((x ^ y) * 8) as u8]));
		let cfg = BuildConfig::default().with_detail_threshold(1.);
		let global = QuadTree::build(&img, &cfg).unwrap();
		let pooled = QuadTree::build(&img, &cfg.clone().with_threads(Some(2))).unwrap();
		let sequential = QuadTree::build(&img, &cfg.with_parallel_depth(0)).unwrap();
		assert_eq!(global, pooled);
		assert_eq!(global, sequential);
	}

	#[test]
	fn view_substitutes_split_nodes_at_depth() {
		let tree = QuadTree::build(&halves(), &BuildConfig::default()).unwrap();
		let at_root = tree.leaf_quadrants(0).unwrap();
		assert_eq!(at_root.len(), 1);
		assert!(!at_root[0].is_leaf());
		assert_eq!(tree.leaf_quadrants(1).unwrap().len(), 4);
	}

	#[test]
	fn too_deep_query_fails() {
		let tree = QuadTree::build(&halves(), &BuildConfig::default()).unwrap();
		assert_eq!(
			tree.leaf_quadrants(2).unwrap_err(),
			QueryError::InvalidDepth { requested: 2, max: 1 }
		);
	}

	#[test]
	fn leaf_shallower_than_target_is_returned() {
		// Top-left quarter busy, rest uniform: only the first quarter splits again.
		let img = RgbImage::from_fn(8, 8, |x, y| {
			if x < 4 && y < 4 && (x + y) % 2 == 0 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
		});
		let tree = QuadTree::build(&img, &BuildConfig::default()).unwrap();
		assert!(tree.max_depth() >= 2);
		let view = tree.leaf_quadrants(2).unwrap();
		assert!(view.iter().any(|q| q.depth == 1 && q.is_leaf()));
		assert_eq!(view.iter().map(|q| q.bbox.area()).sum::<u64>(), 64);
	}
}
