//! Matching pipeline, classifier and audits

pub mod swath_index;
pub mod matcher;
pub mod assembler;
pub mod classifier;
pub mod audit;

// Re-export main types
pub use swath_index::{Nearest, SwathBuildStats, SwathPointIndex};
pub use matcher::{DailyMatcher, DayMatch};
pub use assembler::{Assembly, DatasetAssembler, PresenceEnvelope, BACKGROUND_RATIO};
pub use classifier::{
    cross_validate, parse_feature_row, train, validate_feature_values, CrossValidationReport,
    HabitatModel, Prediction, TrainerParams,
};
pub use audit::{missing_dates, swath_validity, DateGapReport, SwathValidityReport, SwathVerdict};
