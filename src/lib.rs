//! Subsignal - Behavioral signal extraction and guideline bootstrapping
//!
//! Subsignal turns raw per-frame behavioral signals (head/body pose, facial
//! emotion probabilities) captured while a subject reads a described option
//! into structured, labelable Seed records, bootstraps a diagnostic guideline
//! from a small labeled corpus, and applies that guideline to rank unseen
//! option sets by predicted subconscious preference.
//!
//! ## Pipeline
//!
//! - **FeatureExtractor**: deterministic samples → Seed conversion
//! - **SeedStore / GuidelineStore**: atomic on-disk persistence
//! - **Labeler**: attaches the subject's ground truth to a Seed
//! - **GuidelineSynthesizer**: two-stage draft/consolidate guideline bootstrap
//! - **Judge**: guideline-driven ranking of one session's options

pub mod config;
pub mod error;
pub mod extractor;
pub mod judge;
pub mod labeler;
pub mod service;
pub mod stimulus;
pub mod store;
pub mod synthesizer;
pub mod types;

pub use config::{new_session_id, DataPaths};
pub use error::{DataError, PipelineError, ServiceError, StateError, StorageError};
pub use extractor::{ExtractorThresholds, FeatureExtractor};
pub use judge::Judge;
pub use labeler::{LabelOutcome, Labeler, OverwritePolicy};
pub use service::{GeminiClient, GenerationRequest, ReasoningService, ServiceConfig};
pub use stimulus::describe_options;
pub use store::{GuidelineStore, SeedStore};
pub use synthesizer::{GuidelineSynthesizer, SynthesisReport};
pub use types::{Recommendation, Sample, Seed, SeedKey, StimulusContent, TrialRecording};

/// Subsignal version embedded in CLI output
pub const SUBSIGNAL_VERSION: &str = env!("CARGO_PKG_VERSION");
