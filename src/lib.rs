pub mod density;
pub mod dump;
pub mod error;
pub mod finder;
pub mod settings;
pub mod shared;
pub mod subhalo;
pub mod synthetic;
pub mod tree;

pub use error::{Result, SubhaloError};
pub use finder::{FinderReport, SubhaloFinder};
pub use settings::FinderSettings;
pub use shared::{Bounds, Float, HaloParticles};
pub use subhalo::SubhaloTable;
