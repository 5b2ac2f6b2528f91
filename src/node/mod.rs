pub mod config;
pub mod detail;
pub mod error;
pub mod image;
pub mod qtf;
pub mod tree;

pub use config::{BuildConfig, GifOptions};
pub use tree::QuadTree;

/// Axis-aligned pixel rectangle; `right` and `bottom` are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BBox {
	pub left: u32,
	pub top: u32,
	pub right: u32,
	pub bottom: u32,
}

impl BBox {
	/// Rectangle from its edges; `right` and `bottom` are exclusive.
	pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
		BBox { left, top, right, bottom }
	}

	/// The rectangle covering a whole `width` by `height` image.
	pub fn full(width: u32, height: u32) -> Self {
		BBox::new(0, 0, width, height)
	}

	/// Horizontal extent in pixels.
	pub fn width(&self) -> u32 {
		self.right - self.left
	}

	/// Vertical extent in pixels.
	pub fn height(&self) -> u32 {
		self.bottom - self.top
	}

	/// Number of pixels covered.
	pub fn area(&self) -> u64 {
		self.width() as u64 * self.height() as u64
	}

	/// Whether `other` lies entirely within this rectangle.
	pub fn contains(&self, other: &BBox) -> bool {
		self.left <= other.left && self.top <= other.top &&
			other.right <= self.right && other.bottom <= self.bottom
	}

	/// Whether bisecting both axes yields four non-empty rectangles.
	pub fn can_split(&self) -> bool {
		self.width() >= 2 && self.height() >= 2
	}

	/// Bisects both axes at their (truncated) midpoints.
	///
	/// Returned in the order top-left, top-right, bottom-left, bottom-right.
	/// `None` if the rectangle is too small to split.
	pub fn quarters(&self) -> Option<[BBox; 4]> {
		if !self.can_split() {
			return None;
		}
		let mid_x = self.left + self.width() / 2;
		let mid_y = self.top + self.height() / 2;
		Some([
			BBox::new(self.left, self.top, mid_x, mid_y),
			BBox::new(mid_x, self.top, self.right, mid_y),
			BBox::new(self.left, mid_y, mid_x, self.bottom),
			BBox::new(mid_x, mid_y, self.right, self.bottom),
		])
	}
}

/// What lies below a quadrant.
#[derive(Clone, Debug, PartialEq)]
pub enum Children {
	/// The quadrant was not split.
	Leaf,
	/// Exactly four sub-quadrants, ordered as in `BBox::quarters`.
	Split(Box<[Quadrant; 4]>),
}

/// Node in a quadtree describing a region of an image.
///
/// Every node carries the mean color and detail score of its whole region,
/// whether or not it was split, so the tree can be cut off at any depth
/// and still give a meaningful picture.
#[derive(Clone, Debug, PartialEq)]
pub struct Quadrant {
	pub bbox: BBox,
	pub depth: u32,
	pub detail: f64,
	pub color: ::image::Rgb<u8>,
	pub children: Children,
}

impl Quadrant {
	/// Whether this node was left unsplit.
	pub fn is_leaf(&self) -> bool {
		matches!(self.children, Children::Leaf)
	}

	/// The four sub-quadrants, if this node was split.
	pub fn children(&self) -> Option<&[Quadrant; 4]> {
		match &self.children {
			Children::Leaf => None,
			Children::Split(sections) => Some(&**sections),
		}
	}

	/// Number of leaves at or below this node.
	pub fn leaf_count(&self) -> usize {
		match self.children() {
			None => 1,
			Some(sections) => sections.iter().map(Quadrant::leaf_count).sum(),
		}
	}

	/// Number of nodes at or below this node, this one included.
	pub fn node_count(&self) -> usize {
		1 + self.children()
			.map(|sections| sections.iter().map(Quadrant::node_count).sum::<usize>())
			.unwrap_or(0)
	}
}

/// Split policy: a region is subdivided only while it is shallower than the
/// depth limit, busier than the detail threshold, and large enough to yield
/// four non-empty quarters.
pub fn should_split(config: &BuildConfig, bbox: &BBox, depth: u32, detail: f64) -> bool {
	depth < config.max_depth && detail > config.detail_threshold && bbox.can_split()
}
