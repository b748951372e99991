//! Configuration module for incremental segmentation models.
//!
//! This module provides configuration structures and enums for the model factory.
//! It is organized into two main submodules:
//! - `core`: Contains the main configuration structure
//! - `enums`: Contains the enumeration types used in configurations

pub mod core;
pub mod enums;

pub use core::ModelConfig;
pub use enums::{Backbone, FusionMode, NormActKind};
