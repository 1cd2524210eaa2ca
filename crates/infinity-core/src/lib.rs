//! Infinity core library
//!
//! Administers an iterated-learning experiment over chained generations of
//! participants:
//! - Presentation map protocol carried by the client between requests
//! - Flat-file storage of answers per condition, chain and generation
//! - Stimulus loading, triangle generation and answer recording
//! - Validation gate and the per-request page state machine
//! - Transmission analysis of finished generations

#![deny(unsafe_code)]

pub mod analysis;
pub mod config;
pub mod error;
pub mod geometry;
pub mod loader;
pub mod map;
pub mod recorder;
pub mod session;
pub mod store;
pub mod types;
pub mod validation;

pub use analysis::{Analyzer, GenerationAnalysis};
pub use config::{CanvasConfig, ExperimentConfig};
pub use error::{ExperimentError, ExperimentResult, StoreError, StoreResult};
pub use geometry::TriangleGenerator;
pub use loader::{StimulusLoader, StimulusRecord};
pub use map::{PageToken, PresentationMap};
pub use recorder::AnswerRecorder;
pub use session::{
    ExperimentFlow, ExperimentRequest, ExperimentStep, MapState, PageView, RunStatus,
};
pub use store::{FlatFileStore, PathLocks, ReadOutcome};
pub use types::{Condition, Point, Position, RunKey, SetKind, Triangle};
pub use validation::{CheckResult, ValidationGate, ValidationReport};
