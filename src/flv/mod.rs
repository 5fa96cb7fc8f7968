// FLV module

mod codec;
mod tag;
mod writer;

pub use codec::*;
pub use tag::*;
pub use writer::*;
