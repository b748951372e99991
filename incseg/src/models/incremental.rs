//! # Incremental Segmentation Module
//!
//! A BiSeNet backbone shared by a growing list of per-task classifier heads. Each
//! incremental step appends a head; its logits are concatenated after those of all
//! previous tasks, so channel `k` of the output always refers to the same class.
//!
//! New heads can be warm-started from the background class of the first task with
//! [`IncrementalSegmentationModule::init_new_classifier`] (weight imprinting).

use burn::{module::Ignored, prelude::*};
use burn_extra_ops::{resize_bilinear, NormLayers};

use super::{
    bisenet::BiSeNet,
    modules::{ClassifierHead, ClassifierHeadConfig},
    segmentation::SegmentationOutput,
    tta::ensemble,
};
use crate::{
    config::FusionMode,
    error::{IncSegError, IncSegResult},
};

/// Segmentation model with one classifier head per learning task.
#[derive(Module, Debug)]
pub struct IncrementalSegmentationModule<B: Backend> {
    bisenet: BiSeNet<B>,
    cls: Vec<ClassifierHead<B>>,
    classes: Ignored<Vec<usize>>,
    num_classes: usize,
    tot_classes: usize,
    fusion_mode: Ignored<FusionMode>,
}

impl<B: Backend> IncrementalSegmentationModule<B> {
    /// Builds one `c -> c` head for every entry `c` of `classes`.
    ///
    /// # Errors
    ///
    /// - `IncSegError::InvalidClasses` if `classes` is empty or holds a zero.
    /// - `IncSegError::ChannelMismatch` if a head width differs from the channel count
    ///   of the backbone features.
    pub fn new(
        bisenet: BiSeNet<B>,
        num_classes: usize,
        classes: Vec<usize>,
        fusion_mode: FusionMode,
        device: &Device<B>,
    ) -> IncSegResult<Self> {
        if classes.is_empty() {
            return Err(IncSegError::InvalidClasses {
                classes,
                reason: "at least one task is required".to_string(),
            });
        }
        for (task, &count) in classes.iter().enumerate() {
            check_task(task, count, bisenet.out_channels()).map_err(|err| match err {
                IncSegError::InvalidClasses { reason, .. } => IncSegError::InvalidClasses {
                    classes: classes.clone(),
                    reason,
                },
                other => other,
            })?;
        }

        let cls = classes
            .iter()
            .map(|&c| ClassifierHeadConfig::new(c, c).init(device))
            .collect();
        let tot_classes = classes.iter().sum();

        tracing::debug!(?classes, tot_classes, "created incremental classifier heads");

        Ok(Self {
            bisenet,
            cls,
            classes: Ignored(classes),
            num_classes,
            tot_classes,
            fusion_mode: Ignored(fusion_mode),
        })
    }

    /// Runs the backbone and concatenates every head's logits in task order.
    ///
    /// Returns the logits at backbone resolution and, if `return_intermediate` is set,
    /// the backbone features themselves.
    pub fn extract_features(
        &self,
        input: Tensor<B, 4>,
        return_intermediate: bool,
    ) -> (Tensor<B, 4>, Option<Tensor<B, 4>>) {
        let features = self.bisenet.forward(input);
        let logits = self
            .cls
            .iter()
            .map(|head| head.forward(features.clone()))
            .collect();

        (
            Tensor::cat(logits, 1),
            return_intermediate.then_some(features),
        )
    }

    /// # Shapes
    /// - input: `[batch_size, 3, height, width]`
    /// - logits: `[batch_size, tot_classes, height, width]`
    pub fn forward(&self, input: Tensor<B, 4>, return_intermediate: bool) -> SegmentationOutput<B> {
        let [_, _, h, w] = input.dims();
        let (logits, features) = self.extract_features(input, return_intermediate);

        SegmentationOutput::new(resize_bilinear(logits, [h, w]), features)
    }

    /// Multi-scale and flip test-time augmentation, fused with the configured mode.
    pub fn forward_tta(&self, input: Tensor<B, 4>, scales: &[f64], do_flip: bool) -> Tensor<B, 4> {
        ensemble(input, scales, do_flip, &self.fusion_mode.0, |x| {
            self.forward(x, false).logits
        })
    }

    /// Initializes the newest head from the background class of the first head.
    ///
    /// Every class of the last head receives the background weight row and the
    /// background bias lowered by `ln(c_last + 1)`, where `c_last` is the class count
    /// of the last task. The background bias of the first head is lowered by the same
    /// amount, so the background probability mass is split evenly between the old
    /// background and the new classes.
    ///
    /// The shift is applied to the current background bias, so repeated calls
    /// accumulate it. With a single head, that head is both source and target.
    pub fn init_new_classifier(mut self, device: &Device<B>) -> Self {
        let last = self.cls.len() - 1;
        let c_last = self.cls[last].num_classes();
        let shift = ((c_last + 1) as f64).ln();

        let bkg_weight = self.cls[0].background_weight();
        let new_bias =
            self.cls[0].background_bias() - Tensor::<B, 1>::from_floats([shift as f32], device);

        tracing::debug!(task = last, c_last, shift, "imprinting classifier from background");

        self.cls = self
            .cls
            .into_iter()
            .enumerate()
            .map(|(task, head)| {
                let head = if task == last {
                    head.imprint(bkg_weight.clone(), new_bias.clone())
                } else {
                    head
                };
                if task == 0 {
                    head.set_background_bias(new_bias.clone())
                } else {
                    head
                }
            })
            .collect();
        self
    }

    /// Appends a freshly initialized head for a new task of `count` classes.
    ///
    /// # Errors
    ///
    /// Fails like [`Self::new`] for a zero `count` or a width that does not match the
    /// backbone features. The model is returned unchanged only on success.
    pub fn add_classes(mut self, count: usize, device: &Device<B>) -> IncSegResult<Self> {
        let task = self.cls.len();
        check_task(task, count, self.bisenet.out_channels())?;

        self.cls
            .push(ClassifierHeadConfig::new(count, count).init(device));
        self.classes.0.push(count);
        self.tot_classes += count;

        tracing::info!(task, count, tot_classes = self.tot_classes, "added task head");
        Ok(self)
    }

    /// Freezes every normalization layer of the backbone.
    pub fn freeze_normalization_layers(mut self) -> Self {
        self.bisenet = self.bisenet.freeze_norm();
        tracing::debug!(layers = self.bisenet.norm_count(), "froze normalization layers");
        self
    }

    /// Class count of every task, in order.
    pub fn classes(&self) -> &[usize] {
        &self.classes.0
    }

    pub const fn tot_classes(&self) -> usize {
        self.tot_classes
    }

    pub const fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_tasks(&self) -> usize {
        self.cls.len()
    }

    pub fn heads(&self) -> &[ClassifierHead<B>] {
        &self.cls
    }

    pub fn fusion_mode(&self) -> &FusionMode {
        &self.fusion_mode.0
    }

    pub const fn backbone(&self) -> &BiSeNet<B> {
        &self.bisenet
    }
}

fn check_task(task: usize, count: usize, feature_channels: usize) -> IncSegResult<()> {
    if count == 0 {
        return Err(IncSegError::InvalidClasses {
            classes: vec![count],
            reason: format!("task {task} has no classes"),
        });
    }
    if count != feature_channels {
        return Err(IncSegError::ChannelMismatch {
            task,
            expected: count,
            actual: feature_channels,
        });
    }
    Ok(())
}
