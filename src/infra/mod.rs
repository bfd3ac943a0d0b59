mod catalog_file;
mod engine;
mod executor;
mod logging;

pub use catalog_file::*;
pub use engine::*;
pub use executor::*;
pub use logging::*;
