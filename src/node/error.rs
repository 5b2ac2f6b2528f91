use thiserror::Error;

use super::BBox;

/// Reason why an image couldn't be turned into a quadtree.
#[derive(Debug, Error)]
pub enum BuildError {
	/// The source image has no pixels.
	#[error("image has no pixels: {width}x{height}")]
	EmptyImage { width: u32, height: u32 },
	/// A region too small to bisect reached the split step.
	#[error("region {0:?} cannot be split into four non-empty quadrants")]
	DegenerateRegion(BBox),
	/// A configuration value is out of range.
	#[error("invalid build configuration: {0}")]
	InvalidConfig(String),
	/// The worker pool for the build could not be created.
	#[error("could not create worker pool: {0}")]
	Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Reason why a depth-indexed view of a tree couldn't be produced.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
	/// The requested depth is deeper than any leaf in the tree.
	#[error("depth {requested} exceeds the tree's maximum depth {max}")]
	InvalidDepth { requested: u32, max: u32 },
}

/// Reason why a quadtree animation couldn't be written.
#[derive(Debug, Error)]
pub enum DrawError {
	/// The animation encoder rejected a frame.
	#[error("could not encode animation: {0}")]
	Encode(#[from] image::ImageError),
	/// The encoded animation could not be written out or flushed.
	#[error("could not write animation: {0}")]
	Io(#[from] std::io::Error),
}

/// Reason why a tree collection couldn't be encoded.
#[derive(Debug, Error)]
pub enum EncodeError {
	/// More frames or bits than the container format can count.
	#[error("collection too large to encode: {0}")]
	TooLarge(&'static str),
}

/// Reason why a tree collection encoding couldn't be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
	/// There was no valid QTF file header.
	#[error("missing QTF header")]
	MissingHeader,
	/// The header names a format version this reader does not know.
	#[error("unsupported QTF version {0}")]
	UnsupportedVersion(u8),
	/// A field or node was expected but not found.
	#[error("unexpected end of data")]
	InsufficientData,
	/// A node is marked as split but its region cannot be split.
	#[error("split marker on unsplittable region {0:?}")]
	DegenerateRegion(BBox),
	/// The stored maximum depth does not match the decoded tree.
	#[error("stored maximum depth {stored} does not match decoded depth {decoded}")]
	DepthMismatch { stored: u32, decoded: u32 },
	/// Stored dimensions describe an empty image.
	#[error("frame has no pixels: {width}x{height}")]
	EmptyFrame { width: u32, height: u32 },
}
