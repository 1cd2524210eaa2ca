//! Transmission analysis over completed generations

use crate::error::{ExperimentError, ExperimentResult};
use crate::loader::{StimulusLoader, StimulusRecord};
use crate::types::{Condition, SetKind};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Edit distance counted in characters
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == *cb {
                diagonal
            } else {
                1 + diagonal.min(above).min(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Levenshtein distance divided by the longer length; 0 for two empty strings
pub fn normalized_levenshtein(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 0.0;
    }
    levenshtein(a, b) as f64 / longest as f64
}

/// Mean normalized distance between equal-length word lists, paired by position
pub fn mean_normalized_levenshtein(a: &[String], b: &[String]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let total: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| normalized_levenshtein(x, y))
        .sum();
    Some(total / a.len() as f64)
}

/// Count of distinct words in the dynamic set, the stable set, and both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Expressivity {
    pub dynamic: usize,
    pub stable: usize,
    pub combined: usize,
}

pub fn expressivity(dynamic: &[String], stable: &[String]) -> Expressivity {
    let distinct = |words: &[String]| words.iter().collect::<HashSet<_>>().len();
    Expressivity {
        dynamic: distinct(dynamic),
        stable: distinct(stable),
        combined: dynamic.iter().chain(stable).collect::<HashSet<_>>().len(),
    }
}

/// Observed transmission error against a shuffled baseline
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Learnability {
    pub observed: f64,
    pub baseline_mean: f64,
    pub baseline_sd: f64,
    /// `(baseline_mean - observed) / baseline_sd`; `None` when the baseline has no spread
    pub z: Option<f64>,
}

/// Compare the observed error with `simulations` random re-pairings of `current`
pub fn learnability<R: Rng + ?Sized>(
    current: &[String],
    previous: &[String],
    simulations: usize,
    rng: &mut R,
) -> Option<Learnability> {
    let observed = mean_normalized_levenshtein(current, previous)?;
    if simulations == 0 {
        return None;
    }

    let mut shuffled = current.to_vec();
    let samples: Vec<f64> = (0..simulations)
        .filter_map(|_| {
            shuffled.shuffle(rng);
            mean_normalized_levenshtein(&shuffled, previous)
        })
        .collect();

    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let sd = (samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n).sqrt();
    Some(Learnability {
        observed,
        baseline_mean: mean,
        baseline_sd: sd,
        z: (sd > 0.0).then(|| (mean - observed) / sd),
    })
}

/// Summary of one generation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationAnalysis {
    pub condition: Condition,
    pub chain: String,
    pub generation: u32,
    /// Mean normalized distance of stable words to the previous generation
    pub transmission_error: f64,
    pub expressivity: Expressivity,
}

/// Reads finished generations and computes their measures
#[derive(Debug, Clone)]
pub struct Analyzer {
    loader: StimulusLoader,
}

impl Analyzer {
    pub fn new(loader: StimulusLoader) -> Self {
        Self { loader }
    }

    /// Stable words of a generation ordered by stimulus index
    pub fn stable_words(
        &self,
        condition: Condition,
        chain: &str,
        generation: u32,
    ) -> ExperimentResult<Vec<String>> {
        let records = self
            .loader
            .load_records(condition, chain, generation, SetKind::Stable)?;
        Ok(by_stimulus(records).into_values().collect())
    }

    pub fn analyze(
        &self,
        condition: Condition,
        chain: &str,
        generation: u32,
    ) -> ExperimentResult<GenerationAnalysis> {
        if generation == 0 {
            return Err(ExperimentError::Validation(
                "generation 0 has no predecessor".to_string(),
            ));
        }
        let current = self.stable_words(condition, chain, generation)?;
        let previous = self.stable_words(condition, chain, generation - 1)?;
        let transmission_error =
            mean_normalized_levenshtein(&current, &previous).ok_or_else(|| {
                ExperimentError::Validation(format!(
                    "stable sets of generations {} and {} differ in size ({} vs {})",
                    generation,
                    generation - 1,
                    current.len(),
                    previous.len()
                ))
            })?;

        let dynamic = self
            .loader
            .load_words(condition, chain, generation, SetKind::Dynamic)?;

        Ok(GenerationAnalysis {
            condition,
            chain: chain.to_string(),
            generation,
            transmission_error,
            expressivity: expressivity(&dynamic, &current),
        })
    }
}

fn by_stimulus(records: Vec<StimulusRecord>) -> BTreeMap<usize, String> {
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| (record.stimulus.unwrap_or(i), record.word))
        .collect()
}
