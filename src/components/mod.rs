pub mod features;
pub mod ingestion;
pub mod trainer;
pub mod validation;

pub use features::FeatureEngineering;
pub use ingestion::{DataIngestion, DataSource};
pub use trainer::ExternalTrainer;
pub use validation::{
    DataValidation, check_entries_with_policy, check_non_empty, check_required_entries,
    list_entries,
};
