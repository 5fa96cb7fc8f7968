// RTMP protocol utilities

mod chunk_stream;
mod command;
mod constants;
mod data;
mod dh;
mod handshake;
mod messages;
mod packet;
mod request;

pub use chunk_stream::*;
pub use command::*;
pub use constants::*;
pub use data::*;
pub use dh::*;
pub use handshake::*;
pub use messages::*;
pub use packet::*;
pub use request::*;
