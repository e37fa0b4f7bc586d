pub mod cache;
pub mod config;
pub mod protocol;
pub mod provider;
pub mod request;
pub mod sync;

pub use cache::*;
pub use config::*;
pub use protocol::*;
pub use provider::*;
pub use request::*;
pub use sync::*;
