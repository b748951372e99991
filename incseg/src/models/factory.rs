//! # Model Factory
//!
//! Builds the BiSeNet backbone described by a [`ModelConfig`] and wraps it either in
//! a plain single-head model or in an incremental model with one head per task.

use burn::prelude::*;
use burn_extra_ops::NormLayers;

use super::{
    bisenet::{BiSeNet, BiSeNetConfig},
    incremental::IncrementalSegmentationModule,
    segmentation::{SegmentationModule, SegmentationOutput},
};
use crate::{config::ModelConfig, error::IncSegResult};

/// A model built by [`make_model`].
#[derive(Module, Debug)]
pub enum SegmentationModel<B: Backend> {
    /// Backbone with a single fixed classifier.
    Plain(SegmentationModule<B>),
    /// Backbone with one classifier per task.
    Incremental(IncrementalSegmentationModule<B>),
}

impl<B: Backend> SegmentationModel<B> {
    pub fn forward(&self, input: Tensor<B, 4>, return_intermediate: bool) -> SegmentationOutput<B> {
        match self {
            Self::Plain(model) => model.forward(input, return_intermediate),
            Self::Incremental(model) => model.forward(input, return_intermediate),
        }
    }

    pub fn forward_tta(&self, input: Tensor<B, 4>, scales: &[f64], do_flip: bool) -> Tensor<B, 4> {
        match self {
            Self::Plain(model) => model.forward_tta(input, scales, do_flip),
            Self::Incremental(model) => model.forward_tta(input, scales, do_flip),
        }
    }

    pub fn freeze_normalization_layers(self) -> Self {
        match self {
            Self::Plain(model) => Self::Plain(model.freeze_normalization_layers()),
            Self::Incremental(model) => Self::Incremental(model.freeze_normalization_layers()),
        }
    }

    /// Number of output channels of `forward`.
    pub fn output_classes(&self) -> usize {
        match self {
            Self::Plain(model) => model.num_classes(),
            Self::Incremental(model) => model.tot_classes(),
        }
    }

    pub const fn backbone(&self) -> &BiSeNet<B> {
        match self {
            Self::Plain(model) => model.backbone(),
            Self::Incremental(model) => model.backbone(),
        }
    }

    /// The incremental model, if this is one.
    pub const fn as_incremental(&self) -> Option<&IncrementalSegmentationModule<B>> {
        match self {
            Self::Plain(_) => None,
            Self::Incremental(model) => Some(model),
        }
    }

    pub fn into_incremental(self) -> Option<IncrementalSegmentationModule<B>> {
        match self {
            Self::Plain(_) => None,
            Self::Incremental(model) => Some(model),
        }
    }
}

/// Builds a segmentation model from `config`.
///
/// Without `classes` the result is [`SegmentationModel::Plain`]; with a per-task class
/// list it is [`SegmentationModel::Incremental`].
///
/// # Errors
///
/// Returns the configuration error from [`ModelConfig::validate`], or the class list
/// error from [`IncrementalSegmentationModule::new`].
pub fn make_model<B: Backend>(
    config: &ModelConfig,
    classes: Option<Vec<usize>>,
    device: &Device<B>,
) -> IncSegResult<SegmentationModel<B>> {
    config.validate()?;

    let activation = config.norm_act.activation();
    tracing::debug!(norm = ?config.norm_act, ?activation, "selected normalization");

    let bisenet = BiSeNetConfig::new(config.num_classes)
        .with_backbone(config.backbone.clone())
        .with_norm(config.norm_act.clone())
        .init(device);

    tracing::info!(
        backbone = ?config.backbone,
        num_classes = config.num_classes,
        norm_layers = bisenet.norm_count(),
        ?classes,
        "building segmentation model"
    );

    let model = match classes {
        None => SegmentationModel::Plain(SegmentationModule::new(
            bisenet,
            config.fusion_mode.clone(),
            device,
        )),
        Some(classes) => SegmentationModel::Incremental(IncrementalSegmentationModule::new(
            bisenet,
            config.num_classes,
            classes,
            config.fusion_mode.clone(),
            device,
        )?),
    };

    Ok(model)
}
