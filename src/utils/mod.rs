// Utils module

mod env;
mod query_string;
mod url;

pub use env::*;
pub use query_string::*;
pub use url::*;
