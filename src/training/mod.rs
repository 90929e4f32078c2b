pub mod enhancer;
pub mod folders;
pub mod ledger;
pub mod quality;
pub mod repository;
pub mod runner;
pub mod upload;

pub use enhancer::PredictionEnhancer;
pub use folders::TrainingFolderStore;
pub use ledger::{LedgerStats, TrainingSessionLedger};
pub use repository::{TrainingImageRepository, TrainingSnapshot, TrainingStats};
pub use runner::{TrainingOutput, TrainingProgress, TrainingRunner};
pub use upload::ImageUpload;
