//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod png_builder;
pub mod synthetic;
