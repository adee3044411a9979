//! Record and result-envelope types.
//!
//! A [`Record`] is one input line parsed as a self-describing JSON value.
//! Every record that enters the pipeline leaves it as exactly one
//! [`Envelope`], `{"in": <original record>, "out": <result>}`, where the
//! result is the transform output, `null` for records flagged with an
//! `issue`, or an `{"errors": <message>}` object. Envelopes are built once
//! and never mutated.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

/// One logical unit of input data: a parsed line of the source stream.
pub type Record = Value;

/// One output line: the original record paired with its conversion result.
///
/// Serializes exactly as `{"in": ..., "out": ...}`; `out` is `null` when the
/// record was skipped (see [`crate::transform::convert`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "in")]
    pub input: Value,
    #[serde(rename = "out")]
    pub output: Option<Value>,
}

impl Envelope {
    pub fn new(input: Value, output: Option<Value>) -> Self {
        Self { input, output }
    }

    /// An envelope whose result is an `{"errors": <message>}` object.
    pub fn error(input: Value, message: impl Into<String>) -> Self {
        Self {
            input,
            output: Some(json!({ "errors": message.into() })),
        }
    }

    /// The synthetic record written in place of a result the executor never
    /// produced within its deadline.
    pub fn deadline_expired(input: Value, timeout: Duration) -> Self {
        Self::error(
            input,
            format!(
                "Task did not complete in {} seconds.",
                timeout.as_secs_f64()
            ),
        )
    }

    /// True when the result is an `{"errors": ...}` object.
    pub fn is_error(&self) -> bool {
        self.output
            .as_ref()
            .is_some_and(|out| out.get("errors").is_some())
    }
}
