//! QTF, a container for a sequence of built quadtrees (one per frame).
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! "QuTrFr" version:u8 frames:u32
//! per frame: width:u32 height:u32 max_depth:u32 bits:u64 payload
//! ```
//!
//! The payload is the tree in pre-order, bitwise big-endian, padded to a
//! whole byte. Each node is one bit marking subsections, 24 bits of RGB
//! color and the 64 bits of its detail score. Regions and depths are not
//! stored; they follow from the frame dimensions.

use bitvec::order::Msb0;
use bitvec::slice::BitSlice;
use bitvec::vec::BitVec;

use super::error::*;
use super::{BBox, Children, QuadTree, Quadrant};

/// A `BitVec` variant ideal for encoding and decoding quadtrees.
type QuadtreeEncodeBitVec = BitVec<u8, Msb0>;
type QuadtreeBits = BitSlice<u8, Msb0>;

const MAGIC: &[u8; 6] = b"QuTrFr";
const VERSION: u8 = 1;

const COLOR_BITS: usize = 24;
const DETAIL_BITS: usize = 64;
const NODE_BITS: usize = 1 + COLOR_BITS + DETAIL_BITS;

fn push_bits(buffer: &mut QuadtreeEncodeBitVec, value: u64, width: usize) {
	for bit_ind in 0..width {
		buffer.push(value & (1 << (width - bit_ind - 1)) != 0);
	}
}

fn read_bits(buffer: &QuadtreeBits, start: usize, width: usize) -> u64 {
	(0..width).fold(0, |n, bit_ind| (n << 1) | buffer[start + bit_ind] as u64)
}

impl Quadrant {
	/// Appends this node and its subsections to `buffer` in pre-order.
	pub fn encode_v1(&self, buffer: &mut QuadtreeEncodeBitVec) {
		buffer.push(!self.is_leaf());
		let [r, g, b] = self.color.0;
		push_bits(buffer, (r as u64) << 16 | (g as u64) << 8 | b as u64, COLOR_BITS);
		push_bits(buffer, self.detail.to_bits(), DETAIL_BITS);
		if let Some(sections) = self.children() {
			for section in sections.iter() {
				section.encode_v1(buffer);
			}
		}
	}

	/// Parses the node covering `bbox` at `depth` starting at bit `curr_ind`.
	///
	/// Successful return value is the node and the index to which the parser
	/// has progressed. `deepest` is raised to the depth of every leaf read.
	pub fn decode_v1(
		buffer: &QuadtreeBits,
		bbox: BBox,
		depth: u32,
		mut curr_ind: usize,
		deepest: &mut u32,
	) -> Result<(Quadrant, usize), DecodeError> {
		if buffer.len().saturating_sub(curr_ind) < NODE_BITS {
			return Err(DecodeError::InsufficientData);
		}
		let split = buffer[curr_ind];
		let rgb = read_bits(buffer, curr_ind + 1, COLOR_BITS);
		let color = image::Rgb([(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8]);
		let detail = f64::from_bits(read_bits(buffer, curr_ind + 1 + COLOR_BITS, DETAIL_BITS));
		curr_ind += NODE_BITS;

		let children = if split {
			let [tl, tr, bl, br] = bbox.quarters().ok_or(DecodeError::DegenerateRegion(bbox))?;
			let (tl, curr) = Quadrant::decode_v1(buffer, tl, depth + 1, curr_ind, deepest)?;
			let (tr, curr) = Quadrant::decode_v1(buffer, tr, depth + 1, curr, deepest)?;
			let (bl, curr) = Quadrant::decode_v1(buffer, bl, depth + 1, curr, deepest)?;
			let (br, curr) = Quadrant::decode_v1(buffer, br, depth + 1, curr, deepest)?;
			curr_ind = curr;
			Children::Split(Box::new([tl, tr, bl, br]))
		} else {
			*deepest = (*deepest).max(depth);
			Children::Leaf
		};

		Ok((Quadrant { bbox, depth, detail, color, children }, curr_ind))
	}
}

/// Bounds-checked cursor over the raw container bytes.
struct Reader<'a> {
	source: &'a [u8],
	pos: usize,
}

impl<'a> Reader<'a> {
	fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
		let end = self.pos.checked_add(len).ok_or(DecodeError::InsufficientData)?;
		let bytes = self.source.get(self.pos..end).ok_or(DecodeError::InsufficientData)?;
		self.pos = end;
		Ok(bytes)
	}

	fn u32(&mut self) -> Result<u32, DecodeError> {
		let mut bytes = [0; 4];
		bytes.copy_from_slice(self.take(4)?);
		Ok(u32::from_be_bytes(bytes))
	}

	fn u64(&mut self) -> Result<u64, DecodeError> {
		let mut bytes = [0; 8];
		bytes.copy_from_slice(self.take(8)?);
		Ok(u64::from_be_bytes(bytes))
	}
}

/// Encodes a sequence of trees into QTF data.
pub fn to_qtf(trees: &[QuadTree]) -> Result<Vec<u8>, EncodeError> {
	let mut ret = Vec::new();
	// Header (version 1)
	ret.extend_from_slice(MAGIC);
	ret.push(VERSION);
	let count = u32::try_from(trees.len()).map_err(|_| EncodeError::TooLarge("frame count"))?;
	ret.extend_from_slice(&count.to_be_bytes());

	for tree in trees {
		ret.extend_from_slice(&tree.width().to_be_bytes());
		ret.extend_from_slice(&tree.height().to_be_bytes());
		ret.extend_from_slice(&tree.max_depth().to_be_bytes());
		let mut bit_buf = QuadtreeEncodeBitVec::new();
		tree.root().encode_v1(&mut bit_buf);
		ret.extend_from_slice(&(bit_buf.len() as u64).to_be_bytes());
		ret.extend_from_slice(bit_buf.as_raw_slice());
	}
	tracing::debug!(frames = trees.len(), bytes = ret.len(), "encoded QTF");
	Ok(ret)
}

/// Decodes every tree stored in QTF data.
pub fn from_qtf(source: &[u8]) -> Result<Vec<QuadTree>, DecodeError> {
	if source.len() < MAGIC.len() + 1 || &source[..MAGIC.len()] != MAGIC {
		return Err(DecodeError::MissingHeader);
	}
	let mut reader = Reader { source, pos: MAGIC.len() };
	let version = reader.take(1)?[0];
	if version != VERSION {
		return Err(DecodeError::UnsupportedVersion(version));
	}

	let count = reader.u32()?;
	let mut trees = Vec::new();
	for _ in 0..count {
		let width = reader.u32()?;
		let height = reader.u32()?;
		let stored_depth = reader.u32()?;
		if width == 0 || height == 0 {
			return Err(DecodeError::EmptyFrame { width, height });
		}
		let bit_len = usize::try_from(reader.u64()?).map_err(|_| DecodeError::InsufficientData)?;
		let byte_len = bit_len.checked_add(7).ok_or(DecodeError::InsufficientData)? / 8;
		let payload = reader.take(byte_len)?;
		let bits = QuadtreeBits::from_slice(payload)
			.get(..bit_len)
			.ok_or(DecodeError::InsufficientData)?;

		let mut deepest = 0;
		let (root, _) = Quadrant::decode_v1(bits, BBox::full(width, height), 0, 0, &mut deepest)?;
		if deepest != stored_depth {
			return Err(DecodeError::DepthMismatch { stored: stored_depth, decoded: deepest });
		}
		trees.push(QuadTree::from_parts(width, height, root, deepest));
	}
	Ok(trees)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::node::BuildConfig;
	use image::{Rgb, RgbImage};

	fn sample_trees() -> Vec<QuadTree> {
		let busy = RgbImage::from_fn(13, 9, |x, y| Rgb([(x * 19) as u8, (y * 27) as u8, ((x * y) % 256) as u8]));
		let flat = RgbImage::from_pixel(3, 3, Rgb([5, 6, 7]));
		let cfg = BuildConfig::default().with_detail_threshold(2.);
		vec![
			QuadTree::build(&busy, &cfg).unwrap(),
			QuadTree::build(&flat, &cfg).unwrap(),
		]
	}

	#[test]
	fn collection_survives_encoding() {
		let trees = sample_trees();
		let data = to_qtf(&trees).unwrap();
		assert_eq!(&data[..7], b"QuTrFr\x01");
		assert_eq!(from_qtf(&data).unwrap(), trees);
	}

	#[test]
	fn empty_collection() {
		let data = to_qtf(&[]).unwrap();
		assert_eq!(data.len(), 11);
		assert!(from_qtf(&data).unwrap().is_empty());
	}

	#[test]
	fn rejects_bad_header() {
		assert!(matches!(from_qtf(b"QuTr"), Err(DecodeError::MissingHeader)));
		assert!(matches!(from_qtf(b"QuTrIm\x01\0\0\0\0"), Err(DecodeError::MissingHeader)));
		assert!(matches!(from_qtf(b"QuTrFr\x07\0\0\0\0"), Err(DecodeError::UnsupportedVersion(7))));
	}

	#[test]
	fn rejects_truncated_data() {
		let data = to_qtf(&sample_trees()).unwrap();
		for cut in [8, 20, data.len() - 1] {
			assert!(matches!(from_qtf(&data[..cut]), Err(DecodeError::InsufficientData)), "cut at {}", cut);
		}
	}

	#[test]
	fn rejects_oversized_bit_length() {
		let mut data = b"QuTrFr\x01".to_vec();
		for n in [1u32, 4, 4, 0] {
			data.extend_from_slice(&n.to_be_bytes());
		}
		for bit_len in [u64::MAX - 3, u64::MAX, 1 << 40] {
			let mut frame = data.clone();
			frame.extend_from_slice(&bit_len.to_be_bytes());
			frame.extend_from_slice(&[0; 12]);
			assert!(matches!(from_qtf(&frame), Err(DecodeError::InsufficientData)), "bit length {}", bit_len);
		}
	}

	#[test]
	fn rejects_split_marker_on_single_pixel() {
		let mut bits = QuadtreeEncodeBitVec::new();
		bits.push(true);
		push_bits(&mut bits, 0, COLOR_BITS);
		push_bits(&mut bits, 0, DETAIL_BITS);
		let mut data = b"QuTrFr\x01".to_vec();
		for n in [1u32, 1, 1, 0] {
			data.extend_from_slice(&n.to_be_bytes());
		}
		data.extend_from_slice(&(bits.len() as u64).to_be_bytes());
		data.extend_from_slice(bits.as_raw_slice());
		assert!(matches!(from_qtf(&data), Err(DecodeError::DegenerateRegion(b)) if b == BBox::full(1, 1)));
	}

	#[test]
	fn rejects_depth_mismatch() {
		let trees = sample_trees();
		let mut data = to_qtf(&trees[1..]).unwrap();
		// max_depth field of the first frame
		data[11 + 8 + 3] = 4;
		assert!(matches!(
			from_qtf(&data),
			Err(DecodeError::DepthMismatch { stored: 4, decoded: 0 })
		));
	}
}
