//! Presentation map protocol.
//!
//! The map is the whole remaining experiment timeline for one participant,
//! carried by the client between requests:
//!
//! ```text
//! BEGIN||TR-7||TR-0||...||BREAK||TS-d.3||TS-s.9||...||END
//! ```
//!
//! - `BEGIN`  welcome page
//! - `TR-i`   training page for item `i` of the previous dynamic set
//! - `BREAK`  pause between training and test
//! - `TS-d.i` / `TS-s.i`  test page for item `i` of the dynamic or stable set
//! - `END`    experiment completed
//!
//! Each request consumes exactly one token. The server keeps no session, so
//! decoding only guarantees structural well-formedness; index bounds are
//! re-checked against the configuration by the caller.

use crate::error::{ExperimentError, ExperimentResult};
use crate::types::{parse_index, Position, SetKind};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// Token separator. Never appears inside a token.
pub const DELIMITER: &str = "||";

/// One page of the experiment timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageToken {
    Begin,
    Training(usize),
    Break,
    Test(Position),
    End,
}

impl PageToken {
    /// Stimulus index carried by the token, if any
    pub fn index(&self) -> Option<usize> {
        match self {
            PageToken::Training(index) => Some(*index),
            PageToken::Test(position) => Some(position.index),
            PageToken::Begin | PageToken::Break | PageToken::End => None,
        }
    }
}

impl fmt::Display for PageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageToken::Begin => write!(f, "BEGIN"),
            PageToken::Training(index) => write!(f, "TR-{}", index),
            PageToken::Break => write!(f, "BREAK"),
            PageToken::Test(position) => write!(f, "TS-{}", position),
            PageToken::End => write!(f, "END"),
        }
    }
}

impl FromStr for PageToken {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ExperimentError::MalformedMap {
            token: s.to_string(),
        };

        match s {
            "BEGIN" => return Ok(PageToken::Begin),
            "BREAK" => return Ok(PageToken::Break),
            "END" => return Ok(PageToken::End),
            _ => {}
        }

        if let Some(index) = s.strip_prefix("TR-") {
            return parse_index(index)
                .map(PageToken::Training)
                .ok_or_else(malformed);
        }

        if let Some(position) = s.strip_prefix("TS-") {
            return position
                .parse::<Position>()
                .map(PageToken::Test)
                .map_err(|_| malformed());
        }

        Err(malformed())
    }
}

/// Ordered remaining timeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresentationMap {
    tokens: VecDeque<PageToken>,
}

impl PresentationMap {
    /// Build the full timeline for a set of `set_size` stimuli.
    ///
    /// Training order, dynamic test order and stable test order are three
    /// independent uniform permutations.
    pub fn generate<R: Rng + ?Sized>(set_size: usize, rng: &mut R) -> Self {
        let mut tokens = VecDeque::with_capacity(3 * set_size + 3);
        tokens.push_back(PageToken::Begin);

        let mut training: Vec<usize> = (0..set_size).collect();
        training.shuffle(rng);
        tokens.extend(training.into_iter().map(PageToken::Training));

        tokens.push_back(PageToken::Break);

        let mut dynamic: Vec<usize> = (0..set_size).collect();
        dynamic.shuffle(rng);
        let mut stable: Vec<usize> = (0..set_size).collect();
        stable.shuffle(rng);

        for (d, s) in dynamic.into_iter().zip(stable) {
            tokens.push_back(PageToken::Test(Position::new(SetKind::Dynamic, d)));
            tokens.push_back(PageToken::Test(Position::new(SetKind::Stable, s)));
        }

        tokens.push_back(PageToken::End);
        Self { tokens }
    }

    /// Decode a wire map. An empty string is the empty map.
    pub fn decode(encoded: &str) -> ExperimentResult<Self> {
        if encoded.is_empty() {
            return Ok(Self::default());
        }
        let tokens = encoded
            .split(DELIMITER)
            .map(str::parse)
            .collect::<ExperimentResult<VecDeque<_>>>()?;
        Ok(Self { tokens })
    }

    pub fn encode(&self) -> String {
        self.tokens
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(DELIMITER)
    }

    /// Pop the head token. Advancing an empty map is an error: END is always
    /// consumed explicitly, never inferred.
    pub fn advance(mut self) -> ExperimentResult<(PageToken, PresentationMap)> {
        let head = self.tokens.pop_front().ok_or(ExperimentError::EmptyMap)?;
        Ok((head, self))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &PageToken> {
        self.tokens.iter()
    }
}

impl FromIterator<PageToken> for PresentationMap {
    fn from_iter<I: IntoIterator<Item = PageToken>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

/// Decode `encoded`, pop its head, and re-encode the remainder
pub fn advance_encoded(encoded: &str) -> ExperimentResult<(PageToken, String)> {
    let (head, rest) = PresentationMap::decode(encoded)?.advance()?;
    Ok((head, rest.encode()))
}
