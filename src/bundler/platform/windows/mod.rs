//! Windows: NSIS installers.

mod nsis;

pub use nsis::NsisBuilder;
