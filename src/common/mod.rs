mod id;
mod peer;

pub use id::*;
pub use peer::*;
