//! Domain types shared by every component

use crate::config::ExperimentConfig;
use crate::error::{ExperimentError, ExperimentResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Experimental condition. Condition 2 forbids reusing a word within a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Condition {
    One,
    Two,
}

impl Condition {
    pub fn number(self) -> u8 {
        match self {
            Condition::One => 1,
            Condition::Two => 2,
        }
    }

    /// Whether answers must be unique within a set
    pub fn enforces_expressivity(self) -> bool {
        matches!(self, Condition::Two)
    }
}

impl TryFrom<u8> for Condition {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Condition::One),
            2 => Ok(Condition::Two),
            other => Err(format!("Condition \"{}\" is invalid", other)),
        }
    }
}

impl From<Condition> for u8 {
    fn from(condition: Condition) -> Self {
        condition.number()
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(Condition::One),
            "2" => Ok(Condition::Two),
            other => Err(format!("Condition \"{}\" is invalid", other)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Which of a generation's two stimulus sets a file or answer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetKind {
    /// Fresh random triangles named anew each generation
    Dynamic,
    /// Triangles carried over unchanged, keyed by a persistent stimulus index
    Stable,
}

impl SetKind {
    /// Single-letter code used in file names and map tokens
    pub fn code(self) -> char {
        match self {
            SetKind::Dynamic => 'd',
            SetKind::Stable => 's',
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "d" => Some(SetKind::Dynamic),
            "s" => Some(SetKind::Stable),
            _ => None,
        }
    }
}

impl fmt::Display for SetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A test item: set plus stimulus index, written `d.12` / `s.3` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub set: SetKind,
    pub index: usize,
}

impl Position {
    pub fn new(set: SetKind, index: usize) -> Self {
        Self { set, index }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.set, self.index)
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (set, index) = s
            .split_once('.')
            .ok_or_else(|| format!("invalid position '{}'", s))?;
        let set = SetKind::from_code(set).ok_or_else(|| format!("invalid position '{}'", s))?;
        let index = parse_index(index).ok_or_else(|| format!("invalid position '{}'", s))?;
        Ok(Position { set, index })
    }
}

/// Parse a plain decimal stimulus index (no sign, no whitespace)
pub(crate) fn parse_index(raw: &str) -> Option<usize> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// A canvas point in whole pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

impl FromStr for Point {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("invalid coordinate pair '{}'", s))?;
        let x = x
            .trim()
            .parse()
            .map_err(|_| format!("invalid x coordinate '{}'", x))?;
        let y = y
            .trim()
            .parse()
            .map_err(|_| format!("invalid y coordinate '{}'", y))?;
        Ok(Point { x, y })
    }
}

/// Triangle stimulus. Point A carries the orienting spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triangle {
    pub a: Point,
    pub b: Point,
    pub c: Point,
}

impl Triangle {
    pub fn new(a: Point, b: Point, c: Point) -> Self {
        Self { a, b, c }
    }

    /// Build from the six wire values `x1, x2, x3, y1, y2, y3`
    pub fn from_wire(xs: [i32; 3], ys: [i32; 3]) -> Self {
        Self {
            a: Point::new(xs[0], ys[0]),
            b: Point::new(xs[1], ys[1]),
            c: Point::new(xs[2], ys[2]),
        }
    }

    /// Tab-separated coordinate columns as stored in set files
    pub fn to_columns(&self) -> String {
        format!("{}\t{}\t{}", self.a, self.b, self.c)
    }
}

/// Chain, generation and condition of a run, checked against the configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunKey {
    pub condition: Condition,
    pub chain: String,
    pub generation: u32,
}

impl RunKey {
    /// Validate raw request values. Every experiment request goes through here
    /// so tampered chain, generation or condition values never reach the store.
    pub fn parse(
        config: &ExperimentConfig,
        chain: &str,
        generation: &str,
        condition: &str,
    ) -> ExperimentResult<Self> {
        let mut problems = Vec::new();

        if !config.is_valid_chain(chain) {
            problems.push(format!("Chain \"{}\" is invalid", chain));
        }

        let generation_number = parse_generation(config, generation);
        if generation_number.is_none() {
            problems.push(format!("Generation \"{}\" is invalid", generation));
        }

        let condition = match condition.parse::<Condition>() {
            Ok(condition) => Some(condition),
            Err(message) => {
                problems.push(message);
                None
            }
        };

        match (generation_number, condition) {
            (Some(generation), Some(condition)) if problems.is_empty() => Ok(RunKey {
                condition,
                chain: chain.to_string(),
                generation,
            }),
            _ => Err(ExperimentError::Validation(problems.join("; "))),
        }
    }

    /// The generation whose output this run learns from
    pub fn previous_generation(&self) -> u32 {
        self.generation - 1
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}||{}||{}", self.condition, self.chain, self.generation)
    }
}

/// A generation number is valid when `0 < g <= max_generation`
pub fn parse_generation(config: &ExperimentConfig, raw: &str) -> Option<u32> {
    let generation: u32 = raw.trim().parse().ok()?;
    (generation > 0 && generation <= config.max_generation).then_some(generation)
}
