//! Gate implementations, one per capability family.

pub mod export;
pub mod file;
pub mod ui;
