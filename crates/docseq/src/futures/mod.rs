mod generator;
mod retry;
mod runtime;
mod sleep_provider;

pub use generator::*;
pub use runtime::*;
pub use sleep_provider::*;
