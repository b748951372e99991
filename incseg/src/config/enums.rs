//! Enumeration types for model configuration.

use core::str::FromStr;

use burn::prelude::*;

use crate::error::IncSegError;

pub use backbones::ResNetVariant as Backbone;
pub use burn_extra_ops::NormActKind;

/// Defines how predictions from several test-time views are combined.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum FusionMode {
    /// Average of the views.
    Mean,
    /// Sum of the views.
    Sum,
    /// Element-wise maximum of the views.
    Max,
}

impl FromStr for FusionMode {
    type Err = IncSegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "sum" => Ok(Self::Sum),
            "max" => Ok(Self::Max),
            _ => Err(IncSegError::InvalidConfiguration {
                reason: format!("unknown fusion mode: {s}"),
            }),
        }
    }
}
