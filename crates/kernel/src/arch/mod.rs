pub mod armv7m;
pub use armv7m::{Armv7m, init};
