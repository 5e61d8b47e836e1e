pub mod anomaly;
pub mod config;
pub mod error;
pub mod request;
pub mod spec;

pub use anomaly::*;
pub use config::Config;
pub use error::*;
pub use request::*;
pub use spec::*;
