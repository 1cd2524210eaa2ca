//! Word and triangle loading from set files.
//!
//! Line formats:
//!
//! ```text
//! dynamic:  word<TAB>x1,y1<TAB>x2,y2<TAB>x3,y3<TAB>HH:MM:SS
//! stable:   index|||word<TAB>x1,y1<TAB>x2,y2<TAB>x3,y3<TAB>HH:MM:SS[<TAB>order]
//! ```
//!
//! The trailing `order` column (1-based presentation order) is only present
//! once a stable set has been finalized.

use crate::error::{ExperimentError, ExperimentResult, StoreError};
use crate::store::{FlatFileStore, ReadOutcome};
use crate::types::{parse_index, Condition, SetKind, Triangle};
use std::path::{Path, PathBuf};

/// Separator between the stimulus index and the word on stable lines
pub const INDEX_SEPARATOR: &str = "|||";

/// One parsed set-file line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StimulusRecord {
    /// Persistent stimulus index (stable set only)
    pub stimulus: Option<usize>,
    pub word: String,
    pub triangle: Triangle,
    pub timestamp: String,
    /// 1-based presentation order (finalized stable sets only)
    pub order: Option<usize>,
}

impl StimulusRecord {
    /// Parse a single line of the given set kind
    pub fn parse(set: SetKind, line: &str) -> Result<Self, String> {
        let columns: Vec<&str> = line.split('\t').collect();
        let expected_ok = match set {
            SetKind::Dynamic => columns.len() == 5,
            SetKind::Stable => columns.len() == 5 || columns.len() == 6,
        };
        if !expected_ok {
            return Err(format!(
                "expected {} tab-separated columns, found {}",
                match set {
                    SetKind::Dynamic => "5",
                    SetKind::Stable => "5 or 6",
                },
                columns.len()
            ));
        }

        let (stimulus, word) = match set {
            SetKind::Dynamic => (None, columns[0].to_string()),
            SetKind::Stable => {
                let (index, word) = columns[0]
                    .split_once(INDEX_SEPARATOR)
                    .ok_or_else(|| format!("missing '{}' stimulus prefix", INDEX_SEPARATOR))?;
                let index = parse_index(index)
                    .ok_or_else(|| format!("invalid stimulus index '{}'", index))?;
                (Some(index), word.to_string())
            }
        };

        let triangle = Triangle::new(
            columns[1].parse()?,
            columns[2].parse()?,
            columns[3].parse()?,
        );

        let order = match columns.get(5) {
            Some(raw) => Some(
                parse_index(raw).ok_or_else(|| format!("invalid presentation order '{}'", raw))?,
            ),
            None => None,
        };

        Ok(Self {
            stimulus,
            word,
            triangle,
            timestamp: columns[4].to_string(),
            order,
        })
    }
}

/// Reads stimulus words and triangles from a generation's set files
#[derive(Debug, Clone)]
pub struct StimulusLoader {
    store: FlatFileStore,
}

impl StimulusLoader {
    pub fn new(store: FlatFileStore) -> Self {
        Self { store }
    }

    /// Raw lines of a set file. A missing file is an error; an empty file has no lines.
    pub fn load_lines(
        &self,
        condition: Condition,
        chain: &str,
        generation: u32,
        set: SetKind,
    ) -> ExperimentResult<(PathBuf, Vec<String>)> {
        let path = self.store.set_path(condition, chain, generation, set);
        let lines = match self.store.read(&path)? {
            ReadOutcome::NotFound => return Err(StoreError::NotFound(path).into()),
            outcome => outcome
                .as_str()
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        };
        Ok((path, lines))
    }

    /// Every record of a set file, in file order
    pub fn load_records(
        &self,
        condition: Condition,
        chain: &str,
        generation: u32,
        set: SetKind,
    ) -> ExperimentResult<Vec<StimulusRecord>> {
        let (path, lines) = self.load_lines(condition, chain, generation, set)?;
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| parse_at(&path, set, i, line))
            .collect()
    }

    /// Words of a set file, in file order
    pub fn load_words(
        &self,
        condition: Condition,
        chain: &str,
        generation: u32,
        set: SetKind,
    ) -> ExperimentResult<Vec<String>> {
        Ok(self
            .load_records(condition, chain, generation, set)?
            .into_iter()
            .map(|record| record.word)
            .collect())
    }

    /// The record on line `index`
    pub fn load_record(
        &self,
        condition: Condition,
        chain: &str,
        generation: u32,
        set: SetKind,
        index: usize,
    ) -> ExperimentResult<StimulusRecord> {
        let (path, lines) = self.load_lines(condition, chain, generation, set)?;
        let line = lines.get(index).ok_or_else(|| ExperimentError::Parse {
            path: path.clone(),
            line: index + 1,
            reason: format!("line {} requested but file has {} lines", index, lines.len()),
        })?;
        parse_at(&path, set, index, line)
    }

    /// The triangle on line `index`
    pub fn load_triangle(
        &self,
        condition: Condition,
        chain: &str,
        generation: u32,
        set: SetKind,
        index: usize,
    ) -> ExperimentResult<Triangle> {
        Ok(self
            .load_record(condition, chain, generation, set, index)?
            .triangle)
    }
}

fn parse_at(path: &Path, set: SetKind, index: usize, line: &str) -> ExperimentResult<StimulusRecord> {
    StimulusRecord::parse(set, line).map_err(|reason| ExperimentError::Parse {
        path: path.to_path_buf(),
        line: index + 1,
        reason,
    })
}
