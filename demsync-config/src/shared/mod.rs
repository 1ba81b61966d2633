mod connection;
mod sync;

pub use connection::*;
pub use sync::*;
