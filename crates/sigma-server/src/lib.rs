//! Sigma server library - axum front end for the Sigma component model.
//!
//! This library provides configuration, logging, the adapter that feeds axum
//! requests into the dispatcher, and the demo applications. It's separated
//! from main.rs to enable integration testing.

pub mod adapter;
pub mod apps;
pub mod config;
pub mod logging;
pub mod state;
