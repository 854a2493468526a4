mod bitmap;
pub(crate) use bitmap::*;
mod crb;
pub(crate) use crb::*;
mod segment;
pub(crate) use segment::*;
mod group;
pub(crate) use group::*;
mod buffer;
pub(crate) use buffer::*;

// the engines themselves
mod learned;
pub use learned::LearnedFtl;
mod direct;
pub use direct::DirectFtl;
mod dftl;
pub use dftl::DftlFtl;
