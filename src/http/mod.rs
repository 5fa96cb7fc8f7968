// HTTP module

mod flv_session;
mod request;
mod rtc_api;
mod server;

pub use flv_session::*;
pub use request::*;
pub use rtc_api::*;
pub use server::*;
