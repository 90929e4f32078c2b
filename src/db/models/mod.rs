pub mod detection;
pub mod folder;
pub mod photo;
pub mod sample;
pub mod session;

pub use detection::{DetectedItem, DetectionResult, EnhancedDetectionResult, TrainingEnhancement};
pub use folder::TrainingFolder;
pub use photo::SavedPhoto;
pub use sample::{PpeItem, PpeLabels, Quality, TrainingSample};
pub use session::{CurrentModel, ModelParameters, SessionStatus, TrainingSession};
