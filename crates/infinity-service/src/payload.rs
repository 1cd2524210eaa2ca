//! Page transition payload.
//!
//! Every request carries the same flat set of fields, as a query string or
//! an urlencoded form. All values arrive as text and are decoded here;
//! [`PagePayload::from_state`] produces the fields for the next request.

use crate::error::{ApiError, ApiResult};
use infinity_core::{ExperimentRequest, MapState, Triangle};
use serde::{Deserialize, Serialize};

/// Flat page transition fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    #[serde(rename = "gen", alias = "generation", skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,
    #[serde(rename = "cond", alias = "condition", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(rename = "a", alias = "answer", skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_x1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_x2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_x3: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_y1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_y2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_y3: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct: Option<String>,
}

impl PagePayload {
    /// Fields for the request that follows an experiment or validation page
    pub fn from_state(state: &MapState) -> Self {
        let coord = |pick: fn(&Triangle) -> i32| {
            state.last_triangle.as_ref().map(|t| pick(t).to_string())
        };
        Self {
            page: Some("experiment".to_string()),
            chain: Some(state.chain.clone()),
            generation: Some(state.generation.to_string()),
            condition: Some(state.condition.to_string()),
            map: state.map.clone(),
            current: state.current.map(|p| p.to_string()),
            answer: None,
            last_x1: coord(|t| t.a.x),
            last_x2: coord(|t| t.b.x),
            last_x3: coord(|t| t.c.x),
            last_y1: coord(|t| t.a.y),
            last_y2: coord(|t| t.b.y),
            last_y3: coord(|t| t.c.y),
            score: Some(state.score.to_string()),
            correct: None,
        }
    }

    /// Decode the experiment fields. Run key values stay raw; the flow checks them.
    pub fn into_request(self) -> ApiResult<ExperimentRequest> {
        let last_triangle = self.last_triangle()?;
        Ok(ExperimentRequest {
            chain: self.chain.unwrap_or_default(),
            generation: self.generation.unwrap_or_default(),
            condition: self.condition.unwrap_or_default(),
            map: self.map,
            score: counter("score", self.score.as_deref())?,
            correct: counter("correct", self.correct.as_deref())?,
            current: self.current.filter(|c| !c.is_empty()),
            answer: self.answer,
            last_triangle,
        })
    }

    fn last_triangle(&self) -> ApiResult<Option<Triangle>> {
        let fields = [
            ("last_x1", &self.last_x1),
            ("last_x2", &self.last_x2),
            ("last_x3", &self.last_x3),
            ("last_y1", &self.last_y1),
            ("last_y2", &self.last_y2),
            ("last_y3", &self.last_y3),
        ];
        let present = fields
            .iter()
            .filter(|(_, value)| value.as_deref().is_some_and(|v| !v.is_empty()))
            .count();
        if present == 0 {
            return Ok(None);
        }
        if present != fields.len() {
            return Err(ApiError::Validation(
                "previous triangle needs all six coordinates".to_string(),
            ));
        }

        let mut values = [0i32; 6];
        for (slot, (name, value)) in values.iter_mut().zip(fields) {
            let raw = value.as_deref().unwrap_or_default();
            *slot = raw
                .trim()
                .parse()
                .map_err(|_| ApiError::Validation(format!("{} \"{}\" is invalid", name, raw)))?;
        }
        Ok(Some(Triangle::from_wire(
            [values[0], values[1], values[2]],
            [values[3], values[4], values[5]],
        )))
    }
}

/// Missing or blank counters are zero
fn counter(name: &str, raw: Option<&str>) -> ApiResult<u32> {
    match raw.map(str::trim) {
        None | Some("") => Ok(0),
        Some(value) => value
            .parse()
            .map_err(|_| ApiError::Validation(format!("{} \"{}\" is invalid", name, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infinity_core::{Condition, Point, Position, SetKind};

    fn state() -> MapState {
        MapState {
            condition: Condition::Two,
            chain: "C".to_string(),
            generation: 4,
            map: Some("TS-s.1||END".to_string()),
            score: 17,
            current: Some(Position::new(SetKind::Dynamic, 9)),
            last_triangle: Some(Triangle::new(
                Point::new(11, 12),
                Point::new(21, 22),
                Point::new(31, 32),
            )),
        }
    }

    #[test]
    fn next_payload_uses_wire_names() {
        let json = serde_json::to_value(PagePayload::from_state(&state())).unwrap();
        assert_eq!(json["page"], "experiment");
        assert_eq!(json["gen"], "4");
        assert_eq!(json["cond"], "2");
        assert_eq!(json["current"], "d.9");
        assert_eq!(json["last_x2"], "21");
        assert_eq!(json["last_y3"], "32");
        assert!(json.get("a").is_none());
    }

    #[test]
    fn payload_round_trips_into_request() {
        let mut payload = PagePayload::from_state(&state());
        payload.answer = Some("wug".to_string());
        let request = payload.into_request().unwrap();

        assert_eq!(
            request,
            ExperimentRequest::from_state(&state(), Some("wug"), 0)
        );
    }

    #[test]
    fn long_field_names_are_accepted() {
        let payload: PagePayload = serde_json::from_str(
            r#"{"page":"validation","chain":"A","generation":"2","condition":"1","answer":"x"}"#,
        )
        .unwrap();
        assert_eq!(payload.generation.as_deref(), Some("2"));
        assert_eq!(payload.condition.as_deref(), Some("1"));
        assert_eq!(payload.answer.as_deref(), Some("x"));
    }

    #[test]
    fn partial_or_bad_coordinates_are_rejected() {
        let mut payload = PagePayload::from_state(&state());
        payload.last_y1 = None;
        assert!(matches!(payload.into_request(), Err(ApiError::Validation(_))));

        let mut payload = PagePayload::from_state(&state());
        payload.last_x1 = Some("left".to_string());
        assert!(matches!(payload.into_request(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn blank_counters_are_zero() {
        assert_eq!(counter("score", None).unwrap(), 0);
        assert_eq!(counter("score", Some(" ")).unwrap(), 0);
        assert_eq!(counter("correct", Some("1")).unwrap(), 1);
        assert!(counter("correct", Some("-1")).is_err());
    }
}
