pub mod defaults;
pub mod paths;
pub mod service;
pub mod settings;
pub mod validation;

pub use paths::AppPaths;
pub use service::{parse_pipeline_config, ConfigService};
pub use settings::PipelineConfig;
