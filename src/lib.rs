pub mod frames;
pub mod node;

pub use node::{error, BBox, BuildConfig, Children, GifOptions, QuadTree, Quadrant};
pub use node::qtf::{from_qtf, to_qtf};
