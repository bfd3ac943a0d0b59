mod args;
mod builtin;
mod catalog;
mod request;

pub use args::*;
pub use builtin::*;
pub use catalog::*;
pub use request::*;
