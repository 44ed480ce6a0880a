pub mod linkage;
pub mod matching;
pub mod models;
pub mod utils;
pub mod verification;

pub use matching::manager::DuplicateDetectionPipeline;
pub use models::contact::{ContactRecord, CrmContact, LinkedInProfile, Origin};
pub use models::stats_models::PipelineResult;
pub use utils::pipeline_config::PipelineConfig;
