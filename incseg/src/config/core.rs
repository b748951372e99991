//! Core configuration structure for the segmentation model factory.

use crate::error::{IncSegError, IncSegResult};
use burn::prelude::*;

use super::enums::*;

/// Main configuration for the segmentation model.
///
/// `output_stride`, `pooling` and `no_pretrained` are accepted and validated but
/// not used when building the network.
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Normalization strategy shared by all normalization layers.
    #[config(default = "NormActKind::BatchNorm")]
    pub norm_act: NormActKind,
    /// Context-path backbone.
    #[config(default = "Backbone::ResNet101")]
    pub backbone: Backbone,
    /// Number of classes produced by the backbone.
    pub num_classes: usize,
    /// How test-time views are fused.
    #[config(default = "FusionMode::Mean")]
    pub fusion_mode: FusionMode,
    /// Ratio between input and backbone feature resolution.
    #[config(default = "16")]
    pub output_stride: usize,
    /// Pooling size of the context module.
    #[config(default = "32")]
    pub pooling: usize,
    /// Skip loading pretrained backbone weights.
    #[config(default = "false")]
    pub no_pretrained: bool,
}

impl ModelConfig {
    /// Builds a configuration from command-line style identifiers.
    ///
    /// Unknown normalization names fall back to plain batch norm.
    ///
    /// # Errors
    ///
    /// Returns `IncSegError::UnsupportedBackbone` for an unknown backbone and
    /// `IncSegError::InvalidConfiguration` for an unknown fusion mode.
    pub fn from_identifiers(
        norm_act: &str,
        backbone: &str,
        num_classes: usize,
        fusion_mode: &str,
    ) -> IncSegResult<Self> {
        let norm_act = match norm_act.parse::<NormActKind>() {
            Ok(kind) => kind,
            Err(never) => match never {},
        };
        let backbone = backbone.parse::<Backbone>()?;
        let fusion_mode = fusion_mode.parse::<FusionMode>()?;

        Ok(Self::new(num_classes)
            .with_norm_act(norm_act)
            .with_backbone(backbone)
            .with_fusion_mode(fusion_mode))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `IncSegError::InvalidConfiguration` if the configuration is invalid.
    pub fn validate(&self) -> IncSegResult<()> {
        if self.num_classes == 0 {
            return Err(IncSegError::InvalidConfiguration {
                reason: "num_classes must be positive".to_string(),
            });
        }

        if !matches!(self.output_stride, 8 | 16 | 32) {
            return Err(IncSegError::InvalidConfiguration {
                reason: format!(
                    "output_stride must be one of 8, 16 or 32, got {}",
                    self.output_stride
                ),
            });
        }

        Ok(())
    }
}
