pub mod common;
pub mod payloads;
pub mod report;
pub mod resources;

pub use common::*;
pub use payloads::*;
pub use report::*;
pub use resources::*;
