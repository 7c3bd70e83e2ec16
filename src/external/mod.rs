#[cfg(test)]
pub mod memory;
pub mod stripe;

pub use stripe::*;
