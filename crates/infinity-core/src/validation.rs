//! Pre-run validation gate

use crate::config::ExperimentConfig;
use crate::loader::StimulusLoader;
use crate::store::FlatFileStore;
use crate::types::{parse_generation, Condition, RunKey, SetKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Shown once every check passes
pub const ADVISORIES: [&str; 2] = [
    "Is the volume level okay?",
    "Are you using the Alpha-only keyboard layout?",
];

/// One row of the validation page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    fn new(name: &str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed,
            detail: detail.into(),
        }
    }
}

/// Ordered check rows plus advisories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub checks: Vec<CheckResult>,
    pub advisories: Vec<String>,
}

impl ValidationReport {
    /// A run may start only when every check passed
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|check| !check.passed)
    }
}

/// Checks bounds, input words, output files and sound assets before a run
#[derive(Debug, Clone)]
pub struct ValidationGate {
    config: Arc<ExperimentConfig>,
    store: FlatFileStore,
    loader: StimulusLoader,
}

impl ValidationGate {
    pub fn new(config: Arc<ExperimentConfig>, store: FlatFileStore) -> Self {
        Self {
            loader: StimulusLoader::new(store.clone()),
            config,
            store,
        }
    }

    /// Run all six checks in order. File checks fail outright when the run
    /// key itself is invalid, so raw input never becomes a path.
    pub fn validate_run(&self, chain: &str, generation: &str, condition: &str) -> ValidationReport {
        let chain = chain.trim();
        let generation = generation.trim();
        let condition = condition.trim();
        let mut checks = Vec::with_capacity(6);

        checks.push(if self.config.is_valid_chain(chain) {
            CheckResult::new("chain", true, format!("Chain {}", chain))
        } else {
            CheckResult::new("chain", false, format!("Chain \"{}\" is invalid", chain))
        });

        checks.push(match parse_generation(&self.config, generation) {
            Some(g) => CheckResult::new("generation", true, format!("Generation {}", g)),
            None => CheckResult::new(
                "generation",
                false,
                format!("Generation \"{}\" is invalid", generation),
            ),
        });

        checks.push(match condition.parse::<Condition>() {
            Ok(c) => CheckResult::new("condition", true, format!("Experimental condition {}", c)),
            Err(message) => CheckResult::new("condition", false, message),
        });

        let run = RunKey::parse(&self.config, chain, generation, condition).ok();
        let input_words = run.as_ref().and_then(|run| {
            self.loader
                .load_words(
                    run.condition,
                    &run.chain,
                    run.previous_generation(),
                    SetKind::Dynamic,
                )
                .ok()
        });

        checks.push(self.check_input_set(input_words.as_deref()));
        checks.push(self.check_output_files(run.as_ref(), chain, condition));
        checks.push(self.check_sound_files(input_words.as_deref()));

        let mut report = ValidationReport {
            checks,
            advisories: Vec::new(),
        };
        if report.passed() {
            report.advisories = ADVISORIES.iter().map(|a| a.to_string()).collect();
        } else {
            let failed: Vec<&str> = report.failures().map(|c| c.name.as_str()).collect();
            warn!(chain, generation, condition, failed = ?failed, "run validation failed");
        }
        report
    }

    fn check_input_set(&self, words: Option<&[String]>) -> CheckResult {
        match words {
            Some(words) if words.len() == self.config.set_size => {
                CheckResult::new("input_set", true, "Words in the input set are valid")
            }
            _ => CheckResult::new(
                "input_set",
                false,
                format!(
                    "Input set file does not contain {} words",
                    self.config.set_size
                ),
            ),
        }
    }

    fn check_output_files(&self, run: Option<&RunKey>, chain: &str, condition: &str) -> CheckResult {
        let ready = run.is_some_and(|run| {
            [SetKind::Dynamic, SetKind::Stable].iter().all(|set| {
                self.store.is_writable(&self.store.set_path(
                    run.condition,
                    &run.chain,
                    run.generation,
                    *set,
                ))
            })
        });
        if ready {
            CheckResult::new("output_files", true, "Output data files are ready for writing")
        } else {
            CheckResult::new(
                "output_files",
                false,
                format!(
                    "Missing output data files at /data/{}/{}/",
                    condition, chain
                ),
            )
        }
    }

    fn check_sound_files(&self, words: Option<&[String]>) -> CheckResult {
        let Some(words) = words else {
            return CheckResult::new(
                "sound_files",
                false,
                "Sound files cannot be checked without a readable input set",
            );
        };

        let missing: Vec<String> = words
            .iter()
            .map(|word| self.vocalization_file(word))
            .filter(|name| !self.config.vocalization_dir.join(name).is_file())
            .collect();

        if missing.is_empty() {
            CheckResult::new("sound_files", true, "Required sound files are available")
        } else {
            CheckResult::new(
                "sound_files",
                false,
                format!(
                    "The following sound files are missing: {}",
                    missing.join(", ")
                ),
            )
        }
    }

    fn vocalization_file(&self, word: &str) -> String {
        format!("{}.{}", word, self.config.audio_extension)
    }

    /// Location of the vocalization for `word`
    pub fn vocalization_path(&self, word: &str) -> PathBuf {
        self.config.vocalization_dir.join(self.vocalization_file(word))
    }
}
