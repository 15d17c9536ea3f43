use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubhaloError {
    #[error("no particles bound; call set_particles before find_subhalos")]
    NoParticles,
    #[error("halo contains no particles")]
    EmptyHalo,
    #[error("particle array `{name}` has length {actual}, expected {expected}")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("particles {first} and {second} share coordinates and cannot be separated by the tree")]
    CoincidentParticles { first: usize, second: usize },
    #[error("particle {index} lies outside the tree bounds")]
    OutOfBounds { index: usize },
    #[error("invalid setting `{name}`: {reason}")]
    InvalidSettings {
        name: &'static str,
        reason: &'static str,
    },
    #[error("particle {index} has tag {tag}, which does not fit the 32-bit debug record")]
    TagOverflow { index: usize, tag: i64 },
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SubhaloError>;
