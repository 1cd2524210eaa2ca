//! Per-request experiment flow.
//!
//! The server keeps no session. Each request carries the run key, the
//! remaining map and the pending answer; [`ExperimentFlow::step`] consumes one
//! map token, performs that page's side effects and returns the page view
//! together with the [`MapState`] the client must send back next.

use crate::config::{CanvasConfig, ExperimentConfig};
use crate::error::{ExperimentError, ExperimentResult};
use crate::geometry::TriangleGenerator;
use crate::loader::StimulusLoader;
use crate::map::{PageToken, PresentationMap};
use crate::recorder::AnswerRecorder;
use crate::store::FlatFileStore;
use crate::types::{Condition, Position, RunKey, SetKind, Triangle};
use crate::validation::{ValidationGate, ValidationReport};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Round-tripped state of a run between two requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapState {
    pub condition: Condition,
    pub chain: String,
    pub generation: u32,
    /// Encoded remaining map; `None` until the run's map is generated
    pub map: Option<String>,
    /// Training score accumulated so far (client-supplied)
    pub score: u32,
    /// Test item currently on screen, whose answer comes with the next request
    pub current: Option<Position>,
    /// Triangle currently on screen
    pub last_triangle: Option<Triangle>,
}

/// One experiment request, as received. Nothing here is trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExperimentRequest {
    pub chain: String,
    pub generation: String,
    pub condition: String,
    /// `None` starts a new run; `Some("")` is an exhausted map
    pub map: Option<String>,
    pub score: u32,
    pub correct: u32,
    /// Wire form of the position being answered, e.g. `s.4`
    pub current: Option<String>,
    pub answer: Option<String>,
    pub last_triangle: Option<Triangle>,
}

impl ExperimentRequest {
    /// Start of a run: no map yet
    pub fn begin(chain: &str, generation: u32, condition: Condition) -> Self {
        Self {
            chain: chain.to_string(),
            generation: generation.to_string(),
            condition: condition.to_string(),
            ..Default::default()
        }
    }

    /// The request a client builds from the previous response's state
    pub fn from_state(state: &MapState, answer: Option<&str>, correct: u32) -> Self {
        Self {
            chain: state.chain.clone(),
            generation: state.generation.to_string(),
            condition: state.condition.to_string(),
            map: state.map.clone(),
            score: state.score,
            correct,
            current: state.current.map(|p| p.to_string()),
            answer: answer.map(str::to_string),
            last_triangle: state.last_triangle,
        }
    }
}

/// Data for the training page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingPage {
    pub index: usize,
    pub word: String,
    pub triangle: Triangle,
    /// Vocalization asset for `word`
    pub audio: String,
    pub word_delay_ms: u64,
    pub display_ms: u64,
    pub canvas: CanvasConfig,
}

/// Data for a test page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestPage {
    pub position: Position,
    pub triangle: Triangle,
    /// Words already given in this set; only filled when answers must be unique
    pub used_words: Vec<String>,
    pub canvas: CanvasConfig,
}

/// What the renderer should show
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageView {
    Parameters {
        chain_codes: Vec<String>,
        max_generation: u32,
        conditions: Vec<u8>,
    },
    Validation(ValidationReport),
    Welcome {
        run: RunKey,
    },
    Training(TrainingPage),
    Break {
        countdown_secs: u64,
        score: u32,
        no_repeat_reminder: bool,
    },
    Test(TestPage),
    Complete {
        run: RunKey,
    },
}

/// Result of one experiment request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentStep {
    pub view: PageView,
    /// State to embed in the next request; `None` once the run is complete
    pub next: Option<MapState>,
}

/// Run recorded in the status file plus progress of its output files
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub run: RunKey,
    pub dynamic_answers: usize,
    pub stable_answers: usize,
    pub set_size: usize,
}

/// Wires every component together behind the page state machine
pub struct ExperimentFlow {
    config: Arc<ExperimentConfig>,
    store: FlatFileStore,
    loader: StimulusLoader,
    recorder: AnswerRecorder,
    generator: TriangleGenerator,
    gate: ValidationGate,
}

impl ExperimentFlow {
    pub fn new(config: Arc<ExperimentConfig>) -> Self {
        let store = FlatFileStore::new(&config.data_dir);
        Self {
            loader: StimulusLoader::new(store.clone()),
            recorder: AnswerRecorder::new(config.clone(), store.clone()),
            generator: TriangleGenerator::new(&config),
            gate: ValidationGate::new(config.clone(), store.clone()),
            store,
            config,
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn store(&self) -> &FlatFileStore {
        &self.store
    }

    pub fn gate(&self) -> &ValidationGate {
        &self.gate
    }

    /// Settings form choices
    pub fn parameters(&self) -> PageView {
        PageView::Parameters {
            chain_codes: self.config.chain_codes.clone(),
            max_generation: self.config.max_generation,
            conditions: vec![Condition::One.number(), Condition::Two.number()],
        }
    }

    /// Validation page. The next state is only offered when every check passed.
    pub fn validate(&self, chain: &str, generation: &str, condition: &str) -> ExperimentStep {
        let report = self.gate.validate_run(chain, generation, condition);
        let next = if report.passed() {
            RunKey::parse(&self.config, chain.trim(), generation, condition)
                .ok()
                .map(|run| MapState {
                    condition: run.condition,
                    chain: run.chain,
                    generation: run.generation,
                    map: None,
                    score: 0,
                    current: None,
                    last_triangle: None,
                })
        } else {
            None
        };
        ExperimentStep {
            view: PageView::Validation(report),
            next,
        }
    }

    pub fn step<R: Rng + ?Sized>(
        &self,
        request: &ExperimentRequest,
        rng: &mut R,
    ) -> ExperimentResult<ExperimentStep> {
        self.step_at(request, rng, Utc::now())
    }

    /// Consume one map token at time `now`
    pub fn step_at<R: Rng + ?Sized>(
        &self,
        request: &ExperimentRequest,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> ExperimentResult<ExperimentStep> {
        let run = RunKey::parse(
            &self.config,
            request.chain.trim(),
            &request.generation,
            &request.condition,
        )
        .inspect_err(|err| warn!(error = %err, "rejected experiment request"))?;

        let map = match &request.map {
            None => PresentationMap::generate(self.config.set_size, rng),
            Some(encoded) => PresentationMap::decode(encoded)
                .inspect_err(|err| warn!(run = %run, error = %err, "map error"))?,
        };
        let (token, rest) = map
            .advance()
            .inspect_err(|err| warn!(run = %run, error = %err, "map error"))?;
        self.check_index(token.index())?;
        debug!(run = %run, token = %token, remaining = rest.len(), "serving page");

        let mut next = MapState {
            condition: run.condition,
            chain: run.chain.clone(),
            generation: run.generation,
            map: Some(rest.encode()),
            score: request.score,
            current: None,
            last_triangle: None,
        };

        let view = match token {
            PageToken::Begin => {
                self.recorder.clear_run(&run)?;
                self.recorder.mark_active_run(&run)?;
                next.score = 0;
                info!(run = %run, "run started");
                PageView::Welcome { run }
            }
            PageToken::Training(index) => {
                let record = self.loader.load_record(
                    run.condition,
                    &run.chain,
                    run.previous_generation(),
                    SetKind::Dynamic,
                    index,
                )?;
                next.score = request.score.saturating_add(request.correct);
                PageView::Training(TrainingPage {
                    index,
                    audio: self.gate.vocalization_path(&record.word).display().to_string(),
                    word: record.word,
                    triangle: record.triangle,
                    word_delay_ms: self.config.word_delay_ms,
                    display_ms: self.config.time_per_training_item_ms,
                    canvas: self.config.canvas,
                })
            }
            PageToken::Break => {
                let score = request.score.saturating_add(request.correct);
                self.recorder
                    .save_training_score(&run, score, now.naive_utc())?;
                next.score = score;
                PageView::Break {
                    countdown_secs: self.config.break_countdown_secs,
                    score,
                    no_repeat_reminder: run.condition.enforces_expressivity(),
                }
            }
            PageToken::Test(position) => {
                if let Some((answered, text, triangle)) = self.pending_answer(request)? {
                    self.recorder
                        .record_answer(&run, answered, text, &triangle, now.time())?;
                }

                let triangle = match position.set {
                    SetKind::Dynamic => self.generator.generate(rng),
                    SetKind::Stable => self.loader.load_triangle(
                        run.condition,
                        &run.chain,
                        run.previous_generation(),
                        SetKind::Stable,
                        position.index,
                    )?,
                };
                let used_words = if run.condition.enforces_expressivity() {
                    self.loader
                        .load_words(run.condition, &run.chain, run.generation, position.set)?
                } else {
                    Vec::new()
                };

                next.current = Some(position);
                next.last_triangle = Some(triangle);
                PageView::Test(TestPage {
                    position,
                    triangle,
                    used_words,
                    canvas: self.config.canvas,
                })
            }
            PageToken::End => {
                let (answered, text, triangle) =
                    self.pending_answer(request)?.ok_or_else(|| {
                        ExperimentError::Validation("final answer is missing".to_string())
                    })?;
                self.recorder
                    .finalize_stable_set(&run, answered, text, &triangle, now.time())?;
                info!(run = %run, "run complete");
                return Ok(ExperimentStep {
                    view: PageView::Complete { run },
                    next: None,
                });
            }
        };

        Ok(ExperimentStep {
            view,
            next: Some(next),
        })
    }

    /// Run named by the status file, with answer counts so far
    pub fn status(&self) -> ExperimentResult<Option<RunStatus>> {
        let content = self.store.read(&self.config.status_file)?;
        let mut parts = content.as_str().trim().split(crate::map::DELIMITER);
        let (Some(condition), Some(chain), Some(generation), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Ok(None);
        };
        let Ok(run) = RunKey::parse(&self.config, chain, generation, condition) else {
            return Ok(None);
        };

        let count = |set| -> ExperimentResult<usize> {
            let path = self
                .store
                .set_path(run.condition, &run.chain, run.generation, set);
            Ok(self.store.line_count(&path)?.unwrap_or(0))
        };
        Ok(Some(RunStatus {
            dynamic_answers: count(SetKind::Dynamic)?,
            stable_answers: count(SetKind::Stable)?,
            set_size: self.config.set_size,
            run,
        }))
    }

    fn check_index(&self, index: Option<usize>) -> ExperimentResult<()> {
        match index {
            Some(index) if index >= self.config.set_size => Err(ExperimentError::Validation(
                format!("Stimulus index {} is out of range", index),
            )),
            _ => Ok(()),
        }
    }

    /// Answer to the item shown on the previous page, if the request carries one
    fn pending_answer<'r>(
        &self,
        request: &'r ExperimentRequest,
    ) -> ExperimentResult<Option<(Position, &'r str, Triangle)>> {
        let Some(current) = request.current.as_deref().filter(|c| !c.is_empty()) else {
            return Ok(None);
        };
        let position: Position = current
            .parse()
            .map_err(|_| ExperimentError::MalformedMap {
                token: current.to_string(),
            })?;
        self.check_index(Some(position.index))?;

        let text = request
            .answer
            .as_deref()
            .ok_or_else(|| ExperimentError::Validation(format!("answer to {} is missing", position)))?;
        let triangle = request.last_triangle.ok_or_else(|| {
            ExperimentError::Validation(format!("triangle for {} is missing", position))
        })?;
        Ok(Some((position, text, triangle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn flow(set_size: usize) -> (TempDir, ExperimentFlow) {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(ExperimentConfig {
            set_size,
            ..ExperimentConfig::rooted_at(dir.path())
        });
        (dir, ExperimentFlow::new(config))
    }

    fn request(map: &str) -> ExperimentRequest {
        ExperimentRequest {
            map: Some(map.to_string()),
            ..ExperimentRequest::begin("A", 1, Condition::One)
        }
    }

    #[test]
    fn tampered_run_key_is_rejected_before_any_file_access() {
        let (_dir, flow) = flow(3);
        let mut rng = StdRng::seed_from_u64(1);
        let mut req = request("BEGIN||END");
        req.chain = "../../tmp".to_string();
        let err = flow.step(&req, &mut rng).unwrap_err();
        assert!(matches!(err, ExperimentError::Validation(_)));
    }

    #[test]
    fn out_of_range_token_is_rejected() {
        let (_dir, flow) = flow(3);
        let mut rng = StdRng::seed_from_u64(1);
        let err = flow.step(&request("TS-d.3||END"), &mut rng).unwrap_err();
        assert!(err.to_string().contains("Stimulus index 3 is out of range"));
    }

    #[test]
    fn empty_map_and_garbage_map_are_map_errors() {
        let (_dir, flow) = flow(3);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(flow.step(&request(""), &mut rng).unwrap_err().is_map_error());
        assert!(flow
            .step(&request("BEGIN||JUMP"), &mut rng)
            .unwrap_err()
            .is_map_error());
    }

    #[test]
    fn end_without_answer_is_rejected() {
        let (_dir, flow) = flow(3);
        let mut rng = StdRng::seed_from_u64(1);
        let err = flow.step(&request("END"), &mut rng).unwrap_err();
        assert!(matches!(err, ExperimentError::Validation(_)));
    }

    #[test]
    fn malformed_current_position_is_a_map_error() {
        let (_dir, flow) = flow(3);
        let mut rng = StdRng::seed_from_u64(1);
        let mut req = request("TS-d.0||END");
        req.current = Some("q.1".to_string());
        req.answer = Some("wug".to_string());
        req.last_triangle = Some(Triangle::new(
            Point::new(1, 1),
            Point::new(2, 2),
            Point::new(3, 3),
        ));
        assert!(flow.step(&req, &mut rng).unwrap_err().is_map_error());
    }

    #[test]
    fn break_accumulates_client_score() {
        let (_dir, flow) = flow(3);
        let mut rng = StdRng::seed_from_u64(1);
        let mut req = request("BREAK||END");
        req.score = 2;
        req.correct = 1;
        let step = flow.step(&req, &mut rng).unwrap();
        assert!(matches!(
            step.view,
            PageView::Break {
                score: 3,
                no_repeat_reminder: false,
                ..
            }
        ));
        assert_eq!(step.next.unwrap().score, 3);
    }

    #[test]
    fn status_is_none_without_a_run() {
        let (_dir, flow) = flow(3);
        assert_eq!(flow.status().unwrap(), None);
    }

    #[test]
    fn page_view_is_tagged_by_kind() {
        let (_dir, flow) = flow(3);
        let json = serde_json::to_value(flow.parameters()).unwrap();
        assert_eq!(json["kind"], "parameters");
        assert_eq!(json["max_generation"], 10);
    }
}
