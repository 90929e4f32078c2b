pub mod controller;
pub mod detector;
pub mod frame;
mod loop_worker;
pub mod photos;
pub mod pipeline;
pub mod reply;
pub mod scoring;

pub use controller::DetectionController;
pub use detector::{BaseDetector, FixedDetector, SimulatedDetector};
pub use frame::{FileFrameSource, FrameSource};
pub use photos::PhotoHistory;
pub use pipeline::DetectionPipeline;
pub use reply::parse_detection_reply;
pub use scoring::{EnsembleScores, FixedScorer, Scorer, SimulatedScorer, TrainingOutcome};
