//! Class-incremental semantic segmentation on Burn.
//!
//! A BiSeNet backbone is shared by a growing list of per-task classifier heads.
//! Use [`make_model`] to build a model from a [`ModelConfig`]:
//!
//! ```no_run
//! use burn::backend::NdArray;
//! use incseg_burn::{make_model, Backbone, ModelConfig};
//!
//! let config = ModelConfig::new(11).with_backbone(Backbone::ResNet18);
//! let model = make_model::<NdArray>(&config, Some(vec![11, 11]), &Default::default())?
//!     .into_incremental()
//!     .expect("a class list builds an incremental model")
//!     .init_new_classifier(&Default::default());
//! assert_eq!(model.tot_classes(), 22);
//! # Ok::<(), incseg_burn::IncSegError>(())
//! ```

mod config;
mod error;
mod models;

pub use burn_extra_ops::flip;
pub use config::*;
pub use error::{IncSegError, IncSegResult};
pub use models::{
    make_model, modules::ClassifierHead, tta, BiSeNet, BiSeNetConfig,
    IncrementalSegmentationModule, SegmentationModel, SegmentationModule, SegmentationOutput,
    BACKBONE_FEATURES,
};
