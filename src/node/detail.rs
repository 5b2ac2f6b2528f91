//! Per-region color statistics: channel histograms, the luma-weighted
//! detail score derived from them, and the mean color.

use image::{Rgb, RgbImage};

use super::BBox;

/// Luma weights for the red, green and blue channels.
pub const LUMA_WEIGHTS: [f64; 3] = [0.2989, 0.5870, 0.1140];

/// 256-bin intensity counts for each of the red, green and blue channels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Histogram {
	pub channels: [[u32; 256]; 3],
}

impl Default for Histogram {
	fn default() -> Self {
		Histogram { channels: [[0; 256]; 3] }
	}
}

impl Histogram {
	/// Counts every pixel of `img` inside `bbox`.
	pub fn of_region(img: &RgbImage, bbox: BBox) -> Self {
		let mut hist = Histogram::default();
		for y in bbox.top..bbox.bottom {
			for x in bbox.left..bbox.right {
				hist.add(*img.get_pixel(x, y));
			}
		}
		hist
	}

	/// Counts one pixel.
	pub fn add(&mut self, pixel: Rgb<u8>) {
		for (channel, value) in self.channels.iter_mut().zip(pixel.0.iter()) {
			channel[*value as usize] += 1;
		}
	}

	/// Number of pixels counted (taken from the red channel).
	pub fn total(&self) -> u64 {
		self.channels[0].iter().map(|&c| c as u64).sum()
	}

	/// Luma-weighted sum of the per-channel standard deviations.
	///
	/// Higher means more visual variance in the region. An empty histogram
	/// has a detail of 0.
	pub fn detail(&self) -> f64 {
		self.channels.iter()
			.zip(LUMA_WEIGHTS.iter())
			.map(|(channel, weight)| channel_deviation(channel) * weight)
			.sum()
	}

	/// Truncated mean intensity of each channel; black when empty.
	pub fn mean_color(&self) -> Rgb<u8> {
		let mut out = [0u8; 3];
		for (slot, channel) in out.iter_mut().zip(self.channels.iter()) {
			*slot = channel_mean(channel) as u8;
		}
		Rgb(out)
	}
}

fn channel_mean(channel: &[u32; 256]) -> f64 {
	let total: u64 = channel.iter().map(|&c| c as u64).sum();
	if total == 0 {
		return 0.;
	}
	let weighted: u64 = channel.iter()
		.enumerate()
		.map(|(i, &c)| i as u64 * c as u64)
		.sum();
	weighted as f64 / total as f64
}

/// Intensity-weighted standard deviation of one channel.
fn channel_deviation(channel: &[u32; 256]) -> f64 {
	let total: u64 = channel.iter().map(|&c| c as u64).sum();
	if total == 0 {
		return 0.;
	}
	let mean = channel_mean(channel);
	let variance = channel.iter()
		.enumerate()
		.map(|(i, &c)| c as f64 * (mean - i as f64).powi(2))
		.sum::<f64>() / total as f64;
	variance.sqrt()
}
