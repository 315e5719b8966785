//! Kani proofs for the vault fixed-point and pricing helpers

#![cfg_attr(kani, feature(register_tool), register_tool(kanitool))]

pub mod sanitizer;
pub mod generators;

#[cfg(kani)]
pub mod safety;
