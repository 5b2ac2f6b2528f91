use std::io::Write;

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, Rgb, RgbImage};

use super::error::*;
use super::{BBox, GifOptions, Quadrant};

/// Number of extra copies of the full-depth frame closing an animation.
pub const FINAL_FRAME_REPEATS: usize = 4;

const OUTLINE: Rgb<u8> = Rgb([0, 0, 0]);

/// Draws a 1-pixel border along the inside edge of `bbox`.
fn outline(img: &mut RgbImage, bbox: BBox) {
	for x in bbox.left..bbox.right {
		img.put_pixel(x, bbox.top, OUTLINE);
		img.put_pixel(x, bbox.bottom - 1, OUTLINE);
	}
	for y in bbox.top..bbox.bottom {
		img.put_pixel(bbox.left, y, OUTLINE);
		img.put_pixel(bbox.right - 1, y, OUTLINE);
	}
}

/// Paints each quadrant's color over its region on a black canvas.
fn paint(width: u32, height: u32, quadrants: &[&Quadrant], lines: bool) -> RgbImage {
	let mut img = RgbImage::new(width, height);
	for quadrant in quadrants {
		let bbox = quadrant.bbox;
		image::imageops::replace(
			&mut img,
			&RgbImage::from_pixel(bbox.width(), bbox.height(), quadrant.color),
			bbox.left as i64,
			bbox.top as i64,
		);
		if lines {
			outline(&mut img, bbox);
		}
	}
	img
}

impl super::QuadTree {
	/// Renders the tree as seen at `depth` (see `leaf_quadrants`).
	///
	/// With `lines`, every quadrant gets a black outline.
	pub fn render(&self, depth: u32, lines: bool) -> Result<RgbImage, QueryError> {
		let quadrants = self.leaf_quadrants(depth)?;
		Ok(paint(self.width(), self.height(), &quadrants, lines))
	}

	/// Renders every leaf of the tree.
	pub fn render_full(&self, lines: bool) -> RgbImage {
		paint(self.width(), self.height(), &self.view(self.max_depth()), lines)
	}

	/// Frames of the subdivision animation: one per depth below the
	/// maximum, followed by the full-depth image `FINAL_FRAME_REPEATS` times.
	pub fn gif_frames(&self, lines: bool) -> Vec<RgbImage> {
		let last = self.render_full(lines);
		let mut frames = (0..self.max_depth())
			.map(|depth| paint(self.width(), self.height(), &self.view(depth), lines))
			.collect::<Vec<_>>();
		frames.extend(std::iter::repeat(last).take(FINAL_FRAME_REPEATS));
		frames
	}

	/// Encodes `gif_frames` as an animated GIF into `writer`, then flushes it.
	///
	/// The animation is assembled in memory first: the encoder writes the GIF
	/// trailer when dropped and would swallow a failure there.
	pub fn write_gif<W: Write>(&self, mut writer: W, options: &GifOptions) -> Result<(), DrawError> {
		let mut data = Vec::new();
		{
			let mut encoder = GifEncoder::new(&mut data);
			encoder.set_repeat(match options.loop_count {
				0 => Repeat::Infinite,
				n => Repeat::Finite(n),
			})?;
			let delay = Delay::from_numer_denom_ms(options.duration_ms, 1);
			encoder.encode_frames(self.gif_frames(options.lines).into_iter().map(|img| {
				Frame::from_parts(DynamicImage::ImageRgb8(img).into_rgba8(), 0, 0, delay)
			}))?;
		}
		writer.write_all(&data)?;
		writer.flush()?;
		tracing::debug!(
			frames = self.max_depth() as usize + FINAL_FRAME_REPEATS,
			duration_ms = options.duration_ms,
			"encoded animation"
		);
		Ok(())
	}
}
