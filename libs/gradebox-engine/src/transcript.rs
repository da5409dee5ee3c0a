// Splits captured stdout into the submission's console output and the
// harness records framed with the run's nonce.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

const RECORD_SEPARATOR: char = '\u{1e}';

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HarnessRecord {
    Result {
        index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
        /// Pre-rendered form for values JSON cannot carry (undefined, None, NaN)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ms: Option<f64>,
    },
    Fault {
        message: String,
    },
}

pub fn marker(nonce: &str) -> String {
    format!("{}{} ", RECORD_SEPARATOR, nonce)
}

/// Encode a record the way the harness writes it
pub fn frame(nonce: &str, record: &HarnessRecord) -> String {
    // HarnessRecord contains only serializable data
    let json = serde_json::to_string(record).unwrap_or_default();
    format!("{}{}\n", marker(nonce), json)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseValue {
    pub actual: String,
    pub execution_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    pub console: String,
    pub records: Vec<HarnessRecord>,
}

impl Transcript {
    pub fn parse(stdout: &str, nonce: &str) -> Self {
        let marker = marker(nonce);
        let mut transcript = Transcript::default();

        for line in stdout.split_inclusive('\n') {
            let Some(pos) = line.find(&marker) else {
                transcript.console.push_str(line);
                continue;
            };

            let (before, framed) = line.split_at(pos);
            let json = framed[marker.len()..].trim_end();
            match serde_json::from_str::<HarnessRecord>(json) {
                Ok(record) => {
                    transcript.console.push_str(before);
                    transcript.records.push(record);
                }
                Err(e) => {
                    warn!(error = %e, "Malformed harness record; keeping it as console output");
                    transcript.console.push_str(line);
                }
            }
        }

        transcript
    }

    /// First fault reported by the harness
    pub fn fault(&self) -> Option<&str> {
        self.records.iter().find_map(|record| match record {
            HarnessRecord::Fault { message } => Some(message.as_str()),
            _ => None,
        })
    }

    /// A result record the harness could not have written: a second record
    /// for the same case, or one for a case that was never planned
    pub fn unexpected_result(&self, planned: &[usize]) -> Option<usize> {
        let mut seen = HashSet::new();
        self.records.iter().find_map(|record| match record {
            HarnessRecord::Result { index, .. }
                if !planned.contains(index) || !seen.insert(*index) =>
            {
                Some(*index)
            }
            _ => None,
        })
    }

    /// Rendered return value for test case `index`
    pub fn value_for(&self, index: usize) -> Option<CaseValue> {
        self.records.iter().find_map(|record| match record {
            HarnessRecord::Result {
                index: i,
                value,
                text,
                ms,
            } if *i == index => {
                let actual = match (text, value) {
                    (Some(text), _) => text.clone(),
                    (None, Some(value)) => render_value(value),
                    (None, None) => "null".to_string(),
                };
                Some(CaseValue {
                    actual,
                    execution_time_ms: ms.map(|ms| ms.round() as u64),
                })
            }
            _ => None,
        })
    }
}

/// Render a returned value as the text compared against `expectedOutput`.
///
/// Strings are verbatim, arrays are `[a, b]` with nested strings quoted,
/// objects are compact JSON.
///
/// Numbers use serde_json's formatting, which writes exponents without a
/// sign (`1e21` where JavaScript's `String()` gives `1e+21`). The runners
/// send top-level JavaScript numbers pre-rendered as `text`, so the gap only
/// shows for numbers nested in arrays or objects.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(render_nested).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(_) => value.to_string(),
    }
}

fn render_nested(value: &Value) -> String {
    match value {
        Value::String(_) => value.to_string(),
        other => render_value(other),
    }
}
