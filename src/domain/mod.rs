pub mod scenario;

pub use scenario::*;
