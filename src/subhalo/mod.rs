mod assemble;
mod builder;
mod candidate;
mod consolidate;
mod unbind;

pub use assemble::*;
pub use builder::*;
pub use candidate::*;
pub use consolidate::*;
pub use unbind::*;
