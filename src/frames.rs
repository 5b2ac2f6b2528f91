//! Batch handling of frame sequences: loading and resizing frames, building
//! one tree per frame, rendering them back, and flattening renders into
//! spreadsheet-style cell lists.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{ImageError, Rgb, RgbImage};
use rayon::prelude::*;
use thiserror::Error;

use crate::node::error::{BuildError, QueryError};
use crate::node::{BuildConfig, QuadTree};

/// Column and row offset applied to pixel coordinates in cell lists.
pub const DEFAULT_MARGIN: (u32, u32) = (450, 90);

/// Reason why a batch of frames couldn't be loaded, built or rendered.
#[derive(Debug, Error)]
pub enum FrameError {
	/// A frame file could not be opened or decoded.
	#[error("could not load frame {path}: {source}")]
	Load { path: PathBuf, source: ImageError },
	/// One of the frames could not be turned into a tree.
	#[error(transparent)]
	Build(#[from] BuildError),
	/// One of the trees could not be viewed at the requested depth.
	#[error(transparent)]
	Query(#[from] QueryError),
}

/// One colored cell of a spreadsheet-style grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
	pub column: u32,
	pub row: u32,
	/// `#rrggbb`
	pub hex: String,
}

/// Formats a color as `#rrggbb`.
pub fn to_hex(color: Rgb<u8>) -> String {
	let [r, g, b] = color.0;
	format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// Scales `img` to `width` pixels wide, keeping its aspect ratio.
pub fn resize_to_width(img: &RgbImage, width: u32) -> RgbImage {
	let ratio = width as f64 / img.width() as f64;
	let height = (img.height() as f64 * ratio) as u32;
	resize(img, width, height)
}

/// Scales `img` to `height` pixels tall, keeping its aspect ratio.
pub fn resize_to_height(img: &RgbImage, height: u32) -> RgbImage {
	let ratio = height as f64 / img.height() as f64;
	let width = (img.width() as f64 * ratio) as u32;
	resize(img, width, height)
}

fn resize(img: &RgbImage, width: u32, height: u32) -> RgbImage {
	if width == 0 || height == 0 {
		tracing::warn!(width, height, "resize target has no pixels, keeping one row/column");
	}
	image::imageops::resize(img, width.max(1), height.max(1), FilterType::Lanczos3)
}

/// Decodes frame files in parallel, preserving their order. With `width`,
/// every frame is rescaled to that width.
pub fn load_frames<P: AsRef<Path> + Sync>(paths: &[P], width: Option<u32>) -> Result<Vec<RgbImage>, FrameError> {
	paths.par_iter()
		.map(|path| -> Result<RgbImage, FrameError> {
			let path = path.as_ref();
			let img = image::open(path)
				.map_err(|source| FrameError::Load { path: path.to_owned(), source })?
				.to_rgb8();
			Ok(match width {
				Some(w) if w != img.width() => resize_to_width(&img, w),
				_ => img,
			})
		})
		.collect()
}

/// Builds one tree per frame. Frames are independent and built in parallel;
/// the first failure fails the batch.
///
/// `config.threads` bounds the pool for the whole batch rather than for
/// each tree.
pub fn build_batch(frames: &[RgbImage], config: &BuildConfig) -> Result<Vec<QuadTree>, FrameError> {
	config.validate()?;
	let per_frame = config.clone().with_threads(None);
	let build_all = || frames.par_iter()
		.map(|frame| QuadTree::build(frame, &per_frame))
		.collect::<Result<Vec<_>, _>>();
	let trees = match config.threads {
		Some(threads) => rayon::ThreadPoolBuilder::new()
			.num_threads(threads)
			.build()
			.map_err(BuildError::from)?
			.install(build_all)?,
		None => build_all()?,
	};
	tracing::info!(frames = trees.len(), "built quadtrees");
	Ok(trees)
}

/// Renders every tree at `depth`, or at its own maximum depth for `None`.
pub fn render_batch(trees: &[QuadTree], depth: Option<u32>, lines: bool) -> Result<Vec<RgbImage>, FrameError> {
	let renders = trees.par_iter()
		.map(|tree| match depth {
			Some(d) => tree.render(d, lines),
			None => Ok(tree.render_full(lines)),
		})
		.collect::<Result<Vec<_>, QueryError>>()?;
	Ok(renders)
}

/// Lists every pixel of `img` in row-major order as a cell whose position
/// is offset by `margin` (columns, rows).
pub fn pixel_cells(img: &RgbImage, margin: (u32, u32)) -> Vec<Cell> {
	img.enumerate_pixels()
		.map(|(x, y, pixel)| Cell {
			column: x + margin.0,
			row: y + margin.1,
			hex: to_hex(*pixel),
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hex_is_lowercase_and_padded() {
		assert_eq!(to_hex(Rgb([0, 10, 255])), "#000aff");
	}

	#[test]
	fn cells_are_offset_and_row_major() {
		let mut img = RgbImage::new(2, 2);
		img.put_pixel(1, 0, Rgb([255, 0, 0]));
		let cells = pixel_cells(&img, DEFAULT_MARGIN);
		assert_eq!(cells.len(), 4);
		assert_eq!(cells[0], Cell { column: 450, row: 90, hex: "#000000".into() });
		assert_eq!(cells[1], Cell { column: 451, row: 90, hex: "#ff0000".into() });
		assert_eq!(cells[2].row, 91);
	}

	#[test]
	fn resize_keeps_aspect() {
		let img = RgbImage::new(40, 30);
		assert_eq!(resize_to_width(&img, 20).dimensions(), (20, 15));
		assert_eq!(resize_to_height(&img, 60).dimensions(), (80, 60));
		assert_eq!(resize_to_width(&img, 1).dimensions(), (1, 1));
	}

	#[test]
	fn batch_keeps_frame_order() {
		let frames: Vec<_> = (0..6u8)
			.map(|i| RgbImage::from_pixel(4 + i as u32, 4, Rgb([i * 40, 0, 0])))
			.collect();
		let trees = build_batch(&frames, &BuildConfig::default().with_threads(Some(2))).unwrap();
		for (i, tree) in trees.iter().enumerate() {
			assert_eq!(tree.width(), 4 + i as u32);
			assert_eq!(tree.root().color, Rgb([i as u8 * 40, 0, 0]));
		}
	}

	#[test]
	fn batch_fails_on_any_bad_frame() {
		let frames = vec![RgbImage::new(4, 4), RgbImage::new(0, 0)];
		assert!(matches!(
			build_batch(&frames, &BuildConfig::default()),
			Err(FrameError::Build(BuildError::EmptyImage { .. }))
		));
	}

	#[test]
	fn render_batch_checks_depth() {
		let frames = vec![RgbImage::new(4, 4)];
		let trees = build_batch(&frames, &BuildConfig::default()).unwrap();
		assert_eq!(render_batch(&trees, None, false).unwrap()[0], frames[0]);
		assert!(matches!(
			render_batch(&trees, Some(3), false),
			Err(FrameError::Query(QueryError::InvalidDepth { requested: 3, max: 0 }))
		));
	}

	#[test]
	fn batch_rejects_invalid_config() {
		let frames = vec![RgbImage::new(4, 4)];
		let cfg = BuildConfig::default().with_threads(Some(0));
		assert!(matches!(
			build_batch(&frames, &cfg),
			Err(FrameError::Build(BuildError::InvalidConfig(_)))
		));
	}

	#[test]
	fn loaded_frames_are_resized_to_width() {
		let dir = std::env::temp_dir().join("quadtree_frames_test_load");
		std::fs::create_dir_all(&dir).unwrap();
		let paths = [dir.join("wide.png"), dir.join("tall.png")];
		RgbImage::from_pixel(40, 20, Rgb([10, 20, 30])).save(&paths[0]).unwrap();
		RgbImage::from_pixel(10, 30, Rgb([10, 20, 30])).save(&paths[1]).unwrap();

		let frames = load_frames(&paths, Some(20)).unwrap();
		assert_eq!(frames[0].dimensions(), (20, 10));
		assert_eq!(frames[1].dimensions(), (20, 60));
		assert_eq!(*frames[0].get_pixel(5, 5), Rgb([10, 20, 30]));

		let unscaled = load_frames(&paths, None).unwrap();
		assert_eq!(unscaled[1].dimensions(), (10, 30));

		std::fs::remove_dir_all(&dir).ok();
	}

	#[test]
	fn missing_file_names_path() {
		let err = load_frames(&["does/not/exist.png"], None).unwrap_err();
		assert!(matches!(err, FrameError::Load { ref path, .. } if path == Path::new("does/not/exist.png")));
	}
}
