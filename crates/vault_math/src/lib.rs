//! Fixed-point arithmetic for the collateral vault
//! Pure Rust, no unwrap/panic: every fallible
//! operation returns a `MathResult`

pub mod math;
pub mod pricing;

// Re-export commonly used items
pub use math::*;
pub use pricing::*;
