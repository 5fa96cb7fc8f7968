// RTMP command handlers

mod close_stream;
mod connect;
mod create_stream;
mod fc_publish;
mod pause;
mod play;
mod publish;
mod receive;

pub use close_stream::*;
pub use connect::*;
pub use create_stream::*;
pub use fc_publish::*;
pub use pause::*;
pub use play::*;
pub use publish::*;
pub use receive::*;
