//! Test infrastructure for entities-core
//!
//! Provides fixture loading and stochastic document generation.

#![allow(dead_code)]

mod generators;
mod loader;

pub use generators::{mutate, render, EntityModel, Gen, Prop};
pub use loader::{load_fixtures_by_name, ExpectedError, TestCase};
