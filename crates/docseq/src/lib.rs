mod config;
mod date;
mod error;
mod format;
#[cfg(feature = "async-tokio")]
mod futures;
mod generator;
mod policy;
mod store;

pub use crate::config::*;
pub use crate::date::*;
pub use crate::error::*;
pub use crate::format::*;
#[cfg(feature = "async-tokio")]
pub use crate::futures::*;
pub use crate::generator::*;
pub use crate::policy::*;
pub use crate::store::*;
