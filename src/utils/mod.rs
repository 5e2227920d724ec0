//! Small helpers shared by the engine and the binary

pub mod indicator;

pub use indicator::WaitIndicator;
