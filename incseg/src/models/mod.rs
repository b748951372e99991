//! # Model Architectures
//!
//! This module aggregates the segmentation models and their building blocks:
//!
//! - `bisenet`: The shared BiSeNet feature extractor.
//! - `modules`: Network building blocks such as the spatial path, attention
//!   refinement, feature fusion and the per-task classifier head.
//! - `segmentation`: The plain single-head model.
//! - `incremental`: The multi-head model used for class-incremental learning.
//! - `factory`: Builds either model from a `ModelConfig`.
//! - `tta`: Multi-scale and flip test-time augmentation.
//!
//! The components are re-exported for easy access from the parent `models` module.

pub mod bisenet;
pub mod factory;
pub mod incremental;
pub mod modules;
pub mod segmentation;
pub mod tta;

pub use bisenet::*;
pub use factory::*;
pub use incremental::*;
pub use segmentation::*;
