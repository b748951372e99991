mod attention_refinement;
mod classifier_head;
mod conv_block;
mod feature_fusion;
mod spatial_path;

pub use attention_refinement::*;
pub use classifier_head::*;
pub use conv_block::*;
pub use feature_fusion::*;
pub use spatial_path::*;
