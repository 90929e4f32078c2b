//! `ppe-vision` command line: manage training data, run simulated training
//! and analyse frames against the stored samples.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use serde::Serialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use ppe_vision_lib::{
    db::PpeLabels,
    detection::{FileFrameSource, FrameSource, SimulatedDetector, SimulatedScorer},
    export::{write_export, ExportKind},
    init_logging,
    training::ImageUpload,
    PpeVision,
};

#[derive(Parser, Debug)]
#[command(name = "ppe-vision")]
#[command(about = "PPE detection with training-data-backed confidence enhancement")]
#[command(version)]
struct Cli {
    /// Directory holding the database and settings
    #[arg(long, env = "PPE_VISION_DATA_DIR", default_value = ".ppe-vision")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone, Copy, Default)]
struct LabelArgs {
    #[arg(long)]
    helmet: bool,
    #[arg(long)]
    gloves: bool,
    #[arg(long)]
    glasses: bool,
    #[arg(long)]
    mask: bool,
    #[arg(long)]
    vest: bool,
}

impl From<LabelArgs> for PpeLabels {
    fn from(args: LabelArgs) -> Self {
        PpeLabels {
            has_helmet: args.helmet,
            has_gloves: args.gloves,
            has_safety_glasses: args.glasses,
            has_mask: args.mask,
            has_vest: args.vest,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ExportTarget {
    TrainingImages,
    NeuralTraining,
}

impl From<ExportTarget> for ExportKind {
    fn from(target: ExportTarget) -> Self {
        match target {
            ExportTarget::TrainingImages => ExportKind::TrainingImages,
            ExportTarget::NeuralTraining => ExportKind::NeuralTraining,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List training folders
    Folders,
    /// Create an empty training folder
    CreateFolder {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Delete a folder and its samples
    DeleteFolder { id: String },
    /// Store one labeled image
    AddSample {
        path: PathBuf,
        /// Target folder id; the default folder when omitted
        #[arg(long)]
        folder: Option<String>,
        #[command(flatten)]
        labels: LabelArgs,
    },
    /// Delete a sample by id
    DeleteSample { id: String },
    /// Training data and model statistics
    Stats,
    /// Recorded training sessions, newest first
    Sessions,
    /// Run a training session over the given images
    Train {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        folder: Option<String>,
        #[command(flatten)]
        labels: LabelArgs,
    },
    /// Analyse one image
    Detect { path: PathBuf },
    /// Analyse an image file periodically until interrupted
    Watch { path: PathBuf },
    /// Detection photo history
    Photos {
        /// Delete the photo with this id instead of listing
        #[arg(long)]
        delete: Option<String>,
    },
    /// Write a JSON export into a directory
    Export {
        #[arg(value_enum)]
        kind: ExportTarget,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Remove all stored data
    Clear,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsReport {
    training: ppe_vision_lib::training::TrainingStats,
    ledger: ppe_vision_lib::training::LedgerStats,
    needs_retraining: bool,
    recommendations: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let app = PpeVision::open(&cli.data_dir)?;

    match cli.command {
        Command::Folders => {
            for folder in app.folders.get_all_folders().await? {
                println!(
                    "{}  {:<24} {:>4} images  quality {:.2}  confidence {:.1}",
                    folder.id, folder.name, folder.total_images, folder.avg_quality, folder.avg_confidence
                );
            }
        }
        Command::CreateFolder { name, description } => {
            let folder = app.folders.create_folder(&name, &description).await?;
            println!("{}", folder.id);
        }
        Command::DeleteFolder { id } => {
            if !app.folders.delete_folder(&id).await? {
                bail!("no folder with id {id}");
            }
        }
        Command::AddSample { path, folder, labels } => {
            let upload = ImageUpload::from_path(&path).await?;
            let sample = app
                .folders
                .save_sample(upload, labels.into(), folder.as_deref(), None)
                .await?;
            println!("{} ({}, confidence {})", sample.id, sample.quality.as_str(), sample.confidence);
        }
        Command::DeleteSample { id } => {
            if !app.folders.delete_sample(&id).await? {
                bail!("no sample with id {id}");
            }
        }
        Command::Stats => {
            let report = StatsReport {
                training: app.repository.stats().await?,
                ledger: app.ledger.stats().await?,
                needs_retraining: app.ledger.needs_retraining().await?,
                recommendations: app.ledger.recommendations().await?,
            };
            print_json(&report)?;
        }
        Command::Sessions => print_json(&app.ledger.sessions().await?)?,
        Command::Train { paths, folder, labels } => {
            let mut uploads: Vec<(ImageUpload, PpeLabels)> = Vec::with_capacity(paths.len());
            for path in &paths {
                uploads.push((ImageUpload::from_path(path).await?, labels.into()));
            }

            let runner = app.training_runner(Arc::new(SimulatedScorer));
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if signal::ctrl_c().await.is_ok() {
                    trigger.cancel();
                }
            });

            match runner.run(uploads, folder.as_deref(), &cancel).await? {
                Some(output) => print_json(&output.session)?,
                None => info!("Training cancelled; nothing was stored"),
            }
        }
        Command::Detect { path } => {
            let frame = FileFrameSource::new(&path)
                .capture()
                .await?
                .with_context(|| format!("no image data in {}", path.display()))?;
            let pipeline =
                app.detection_pipeline(Arc::new(SimulatedDetector::default()), Arc::new(SimulatedScorer));
            if let Some(photo) = pipeline.analyze_frame(&frame).await? {
                print_json(&photo.detection_result)?;
            }
        }
        Command::Watch { path } => {
            let pipeline = Arc::new(
                app.detection_pipeline(Arc::new(SimulatedDetector::default()), Arc::new(SimulatedScorer)),
            );
            let mut controller = app.detection_controller();
            let mut results = controller.start(Arc::new(FileFrameSource::new(path)), pipeline)?;

            loop {
                tokio::select! {
                    changed = results.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let latest = results.borrow_and_update().clone();
                        if let Some(photo) = latest {
                            println!(
                                "{} confidence {:.1} compliant {} missing {:?}",
                                photo.filename,
                                photo.detection_result.confidence(),
                                photo.detection_result.base.overall_compliance,
                                photo.detection_result.base.missing_items
                            );
                        }
                    }
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, stopping detection");
                        break;
                    }
                }
            }
            controller.stop().await?;
        }
        Command::Photos { delete } => match delete {
            Some(id) => {
                if !app.photos.delete(&id).await? {
                    bail!("no photo with id {id}");
                }
            }
            None => {
                for photo in app.photos.all().await? {
                    println!(
                        "{}  {}  confidence {:.1}",
                        photo.id,
                        photo.filename,
                        photo.detection_result.confidence()
                    );
                }
            }
        },
        Command::Export { kind, out } => {
            let path = write_export(&app.db, &out, kind.into()).await?;
            println!("{}", path.display());
        }
        Command::Clear => app.clear_all().await?,
    }

    Ok(())
}
