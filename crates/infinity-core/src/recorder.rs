//! Answer recording and stable-set finalization

use crate::config::ExperimentConfig;
use crate::error::{ExperimentError, ExperimentResult};
use crate::loader::{StimulusLoader, StimulusRecord, INDEX_SEPARATOR};
use crate::store::{FlatFileStore, PathLocks};
use crate::types::{Position, RunKey, SetKind, Triangle};
use chrono::{NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Persists participant answers to the run's set files
pub struct AnswerRecorder {
    config: Arc<ExperimentConfig>,
    store: FlatFileStore,
    loader: StimulusLoader,
    locks: PathLocks,
}

impl AnswerRecorder {
    pub fn new(config: Arc<ExperimentConfig>, store: FlatFileStore) -> Self {
        Self {
            loader: StimulusLoader::new(store.clone()),
            config,
            store,
            locks: PathLocks::new(),
        }
    }

    /// Append one answer to the dynamic or stable file of `run`
    pub fn record_answer(
        &self,
        run: &RunKey,
        position: Position,
        text: &str,
        triangle: &Triangle,
        at: NaiveTime,
    ) -> ExperimentResult<()> {
        let line = answer_line(position, checked_answer(text)?, triangle, at);
        let path = self
            .store
            .set_path(run.condition, &run.chain, run.generation, position.set);

        self.serialized(&path, || self.store.append(&path, &line))?;
        debug!(run = %run, position = %position, "recorded answer");
        Ok(())
    }

    /// Record the final answer and rewrite the stable set in stimulus order.
    ///
    /// Loads the N-1 stable answers recorded so far, adds the final one,
    /// tags each with its 1-based presentation order and sorts by stimulus
    /// index. This is the only reordering write and happens once, at END.
    pub fn finalize_stable_set(
        &self,
        run: &RunKey,
        position: Position,
        text: &str,
        triangle: &Triangle,
        at: NaiveTime,
    ) -> ExperimentResult<()> {
        if position.set != SetKind::Stable {
            return Err(ExperimentError::UnexpectedFinalPosition {
                position: position.to_string(),
            });
        }
        let final_line = answer_line(position, checked_answer(text)?, triangle, at);
        let set_size = self.config.set_size;

        let path = self
            .store
            .set_path(run.condition, &run.chain, run.generation, SetKind::Stable);

        self.serialized(&path, || -> ExperimentResult<()> {
            let (_, mut lines) = self.loader.load_lines(
                run.condition,
                &run.chain,
                run.generation,
                SetKind::Stable,
            )?;
            if lines.len() < set_size.saturating_sub(1) {
                return Err(ExperimentError::IncompleteSet {
                    path: path.clone(),
                    expected: set_size.saturating_sub(1),
                    found: lines.len(),
                });
            }
            lines.push(final_line.clone());

            let canonical = canonical_order(&path, &lines, set_size)?;
            self.store.write(&path, &canonical)?;
            Ok(())
        })?;

        info!(run = %run, stimuli = set_size, "stable set finalized");
        Ok(())
    }

    /// Append `condition, chain, generation, score, timestamp` to the scores log
    pub fn save_training_score(
        &self,
        run: &RunKey,
        score: u32,
        at: NaiveDateTime,
    ) -> ExperimentResult<()> {
        let line = format!(
            "{}\t{}\t{}\t{}\t{}",
            run.condition,
            run.chain,
            run.generation,
            score,
            at.format("%d/%m/%Y %H:%M:%S")
        );
        let path = &self.config.scores_file;
        self.serialized(path, || self.store.append_log(path, &line))?;
        info!(run = %run, score, "training score saved");
        Ok(())
    }

    /// Empty both output files of `run`. Missing files are an error.
    pub fn clear_run(&self, run: &RunKey) -> ExperimentResult<()> {
        for set in [SetKind::Dynamic, SetKind::Stable] {
            let path = self
                .store
                .set_path(run.condition, &run.chain, run.generation, set);
            self.serialized(&path, || self.store.write(&path, ""))?;
        }
        Ok(())
    }

    /// Overwrite the status file with `condition||chain||generation`
    pub fn mark_active_run(&self, run: &RunKey) -> ExperimentResult<()> {
        let path = &self.config.status_file;
        self.store.ensure(path)?;
        self.store.write(path, &run.to_string())?;
        Ok(())
    }

    fn serialized<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        if self.config.serialize_appends {
            self.locks.with_lock(path, f)
        } else {
            f()
        }
    }
}

/// Format one answer line for `position`'s set
pub fn answer_line(position: Position, text: &str, triangle: &Triangle, at: NaiveTime) -> String {
    let body = format!(
        "{}\t{}\t{}",
        text.trim(),
        triangle.to_columns(),
        at.format("%H:%M:%S")
    );
    match position.set {
        SetKind::Dynamic => body,
        SetKind::Stable => format!("{}{}{}", position.index, INDEX_SEPARATOR, body),
    }
}

fn checked_answer(text: &str) -> ExperimentResult<&str> {
    let trimmed = text.trim();
    // A tab or line break would split the record's columns or lines
    if trimmed.is_empty() || trimmed.chars().any(char::is_control) {
        return Err(ExperimentError::Validation(
            "answer must be a non-blank word without control characters".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Sort stable lines (in presentation order) by stimulus index, appending the
/// 1-based presentation order as a trailing column.
fn canonical_order(path: &Path, lines: &[String], set_size: usize) -> ExperimentResult<String> {
    let mut by_stimulus: BTreeMap<usize, (usize, StimulusRecord)> = BTreeMap::new();

    for (i, line) in lines.iter().enumerate() {
        let record =
            StimulusRecord::parse(SetKind::Stable, line).map_err(|reason| ExperimentError::Parse {
                path: path.to_path_buf(),
                line: i + 1,
                reason,
            })?;
        let stimulus = record.stimulus.unwrap_or_default();
        if stimulus >= set_size {
            return Err(ExperimentError::Parse {
                path: path.to_path_buf(),
                line: i + 1,
                reason: format!("stimulus index {} outside set of {}", stimulus, set_size),
            });
        }
        if by_stimulus.insert(stimulus, (i + 1, record)).is_some() {
            return Err(ExperimentError::DuplicateStimulus {
                path: path.to_path_buf(),
                index: stimulus,
            });
        }
    }

    if by_stimulus.len() != set_size {
        return Err(ExperimentError::IncompleteSet {
            path: path.to_path_buf(),
            expected: set_size,
            found: by_stimulus.len(),
        });
    }

    Ok(by_stimulus
        .into_iter()
        .map(|(stimulus, (order, record))| {
            format!(
                "{}{}{}\t{}\t{}\t{}",
                stimulus,
                INDEX_SEPARATOR,
                record.word,
                record.triangle.to_columns(),
                record.timestamp,
                order
            )
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Condition, Point};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn setup(set_size: usize) -> (TempDir, Arc<ExperimentConfig>, AnswerRecorder, RunKey) {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(ExperimentConfig {
            set_size,
            ..ExperimentConfig::rooted_at(dir.path())
        });
        let store = FlatFileStore::new(&config.data_dir);
        let run = RunKey {
            condition: Condition::One,
            chain: "A".to_string(),
            generation: 1,
        };
        for set in [SetKind::Dynamic, SetKind::Stable] {
            store
                .ensure(&store.set_path(run.condition, "A", 1, set))
                .unwrap();
        }
        let recorder = AnswerRecorder::new(config.clone(), store);
        (dir, config, recorder, run)
    }

    fn triangle() -> Triangle {
        Triangle::new(Point::new(10, 20), Point::new(30, 40), Point::new(50, 60))
    }

    fn time(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn read(config: &ExperimentConfig, set: SetKind) -> String {
        let store = FlatFileStore::new(&config.data_dir);
        store
            .read(&store.set_path(Condition::One, "A", 1, set))
            .unwrap()
            .as_str()
            .to_string()
    }

    #[test]
    fn stable_answer_on_empty_file_is_single_line() {
        let (_dir, config, recorder, run) = setup(3);
        recorder
            .record_answer(
                &run,
                Position::new(SetKind::Stable, 2),
                "  triangle ",
                &triangle(),
                time(14, 3, 12),
            )
            .unwrap();
        assert_eq!(
            read(&config, SetKind::Stable),
            "2|||triangle\t10,20\t30,40\t50,60\t14:03:12"
        );
    }

    #[test]
    fn dynamic_answer_has_no_index_prefix() {
        let (_dir, config, recorder, run) = setup(3);
        recorder
            .record_answer(
                &run,
                Position::new(SetKind::Dynamic, 1),
                "wug",
                &triangle(),
                time(9, 0, 1),
            )
            .unwrap();
        assert_eq!(
            read(&config, SetKind::Dynamic),
            "wug\t10,20\t30,40\t50,60\t09:00:01"
        );
    }

    #[test]
    fn blank_answer_is_rejected() {
        let (_dir, _config, recorder, run) = setup(3);
        let err = recorder
            .record_answer(
                &run,
                Position::new(SetKind::Dynamic, 0),
                "   ",
                &triangle(),
                time(9, 0, 0),
            )
            .unwrap_err();
        assert!(matches!(err, ExperimentError::Validation(_)));
    }

    #[test]
    fn multi_line_answer_is_rejected_and_file_untouched() {
        let (_dir, config, recorder, run) = setup(3);
        recorder
            .record_answer(
                &run,
                Position::new(SetKind::Dynamic, 0),
                "wug",
                &triangle(),
                time(9, 0, 0),
            )
            .unwrap();

        for text in ["foo\nbar", "foo\r\nbar", "foo\rbar", "foo\tbar"] {
            let err = recorder
                .record_answer(
                    &run,
                    Position::new(SetKind::Dynamic, 1),
                    text,
                    &triangle(),
                    time(9, 0, 1),
                )
                .unwrap_err();
            assert!(matches!(err, ExperimentError::Validation(_)), "{:?}", text);
        }

        assert_eq!(
            read(&config, SetKind::Dynamic),
            "wug\t10,20\t30,40\t50,60\t09:00:00"
        );
    }

    #[test]
    fn finalize_sorts_by_stimulus_index() {
        let (_dir, config, recorder, run) = setup(4);
        for (i, (index, word)) in [(2, "c"), (0, "a"), (3, "d")].iter().enumerate() {
            recorder
                .record_answer(
                    &run,
                    Position::new(SetKind::Stable, *index),
                    word,
                    &triangle(),
                    time(10, 0, i as u32),
                )
                .unwrap();
        }
        recorder
            .finalize_stable_set(
                &run,
                Position::new(SetKind::Stable, 1),
                "b",
                &triangle(),
                time(10, 0, 9),
            )
            .unwrap();

        let content = read(&config, SetKind::Stable);
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "0|||a\t10,20\t30,40\t50,60\t10:00:01\t2");
        assert_eq!(lines[1], "1|||b\t10,20\t30,40\t50,60\t10:00:09\t4");
        assert_eq!(lines[2], "2|||c\t10,20\t30,40\t50,60\t10:00:00\t1");
        assert_eq!(lines[3], "3|||d\t10,20\t30,40\t50,60\t10:00:02\t3");
    }

    #[test]
    fn finalize_requires_prior_answers() {
        let (_dir, _config, recorder, run) = setup(4);
        recorder
            .record_answer(
                &run,
                Position::new(SetKind::Stable, 0),
                "a",
                &triangle(),
                time(10, 0, 0),
            )
            .unwrap();
        let err = recorder
            .finalize_stable_set(
                &run,
                Position::new(SetKind::Stable, 1),
                "b",
                &triangle(),
                time(10, 0, 1),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ExperimentError::IncompleteSet {
                expected: 3,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn finalize_rejects_duplicate_stimulus() {
        let (_dir, _config, recorder, run) = setup(2);
        recorder
            .record_answer(
                &run,
                Position::new(SetKind::Stable, 0),
                "a",
                &triangle(),
                time(10, 0, 0),
            )
            .unwrap();
        let err = recorder
            .finalize_stable_set(
                &run,
                Position::new(SetKind::Stable, 0),
                "again",
                &triangle(),
                time(10, 0, 1),
            )
            .unwrap_err();
        assert!(matches!(err, ExperimentError::DuplicateStimulus { index: 0, .. }));
    }

    #[test]
    fn finalize_rejects_dynamic_position() {
        let (_dir, _config, recorder, run) = setup(1);
        let err = recorder
            .finalize_stable_set(
                &run,
                Position::new(SetKind::Dynamic, 0),
                "a",
                &triangle(),
                time(10, 0, 0),
            )
            .unwrap_err();
        assert!(matches!(err, ExperimentError::UnexpectedFinalPosition { .. }));
    }

    #[test]
    fn scores_log_is_created_and_appended() {
        let (_dir, config, recorder, run) = setup(3);
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(8, 5, 0)
            .unwrap();
        recorder.save_training_score(&run, 2, at).unwrap();
        recorder.save_training_score(&run, 3, at).unwrap();

        let store = FlatFileStore::new(&config.data_dir);
        assert_eq!(
            store.read(&config.scores_file).unwrap().as_str(),
            "1\tA\t1\t2\t09/03/2024 08:05:00\n1\tA\t1\t3\t09/03/2024 08:05:00"
        );
    }

    #[test]
    fn clear_and_mark_run() {
        let (_dir, config, recorder, run) = setup(3);
        recorder
            .record_answer(
                &run,
                Position::new(SetKind::Dynamic, 0),
                "wug",
                &triangle(),
                time(9, 0, 0),
            )
            .unwrap();
        recorder.clear_run(&run).unwrap();
        recorder.mark_active_run(&run).unwrap();

        assert_eq!(read(&config, SetKind::Dynamic), "");
        let store = FlatFileStore::new(&config.data_dir);
        assert_eq!(store.read(&config.status_file).unwrap().as_str(), "1||A||1");
    }
}
