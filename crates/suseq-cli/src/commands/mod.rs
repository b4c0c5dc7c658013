//! Command implementations for suseq

pub mod check;
pub mod replay;

pub use check::check;
pub use replay::replay;
