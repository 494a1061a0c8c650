//! Sequence plans: the validated, immutable step list the engine plays.
//!
//! Plans come from a JSON or TOML document:
//!
//! ```json
//! {
//!   "name": "wave",
//!   "description": "open and close every panel",
//!   "steps": [
//!     { "time_ms": 100, "servo_positions": [1000, 1000], "speed": 20 },
//!     { "time_ms": 500, "servo_positions": [2000, -1], "start_servo": 1, "end_servo": 1 }
//!   ]
//! }
//! ```
//!
//! `time_ms` is the wait *since the previous step*, not an absolute time.

use std::path::Path;

use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use sith_types::{SithError, pulse};

// ─────────────────────────────────────────────────────────────────────────────
// Document format
// ─────────────────────────────────────────────────────────────────────────────

/// On-disk plan document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanDocument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<StepDocument>,
}

/// One step as written in a plan document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StepDocument {
    /// Milliseconds to wait after the previous step before applying this one.
    pub time_ms: u64,
    /// Pulse width per channel starting at channel 1; `-1` stops the channel.
    pub servo_positions: Vec<i32>,
    /// Speed limit applied before each position when greater than zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<i32>,
    /// First channel (1-based, inclusive) this step touches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_servo: Option<usize>,
    /// Last channel (1-based, inclusive) this step touches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_servo: Option<usize>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Validated plan
// ─────────────────────────────────────────────────────────────────────────────

/// Inclusive 1-based channel window.  `end == None` runs to the end of the
/// servo bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRange {
    pub start: usize,
    pub end: Option<usize>,
}

impl Default for ChannelRange {
    fn default() -> Self {
        Self {
            start: 1,
            end: None,
        }
    }
}

impl ChannelRange {
    pub fn contains(&self, channel: usize) -> bool {
        channel >= self.start && self.end.is_none_or(|end| channel <= end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceStep {
    pub offset_ms: u64,
    pub channel_values: Vec<i32>,
    pub speed_limit: Option<i32>,
    pub channel_range: ChannelRange,
    pub label: String,
}

/// An ordered, validated list of steps.  Never edited after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePlan {
    name: String,
    description: String,
    steps: Vec<SequenceStep>,
}

impl SequencePlan {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&SequenceStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Validate a parsed document.
    ///
    /// # Errors
    ///
    /// [`SithError::SequenceLoad`] naming the first offending step.
    pub fn from_document(document: PlanDocument) -> Result<Self, SithError> {
        let steps = document
            .steps
            .into_iter()
            .enumerate()
            .map(|(index, step)| validate_step(index, step))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: document.name,
            description: document.description,
            steps,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, SithError> {
        let document: PlanDocument = serde_json::from_str(raw)
            .map_err(|e| SithError::SequenceLoad(format!("invalid JSON plan: {e}")))?;
        Self::from_document(document)
    }

    pub fn from_toml(raw: &str) -> Result<Self, SithError> {
        let document: PlanDocument = toml::from_str(raw)
            .map_err(|e| SithError::SequenceLoad(format!("invalid TOML plan: {e}")))?;
        Self::from_document(document)
    }

    /// Read a plan from disk.  The format follows the file extension
    /// (`.json` or `.toml`).
    pub fn load_file(path: &Path) -> Result<Self, SithError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SithError::SequenceLoad(format!("cannot read {}: {e}", path.display()))
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&raw),
            Some("toml") => Self::from_toml(&raw),
            _ => Err(SithError::SequenceLoad(format!(
                "{}: unsupported plan format (expected .json or .toml)",
                path.display()
            ))),
        }
    }

    /// Convert MarcDuino panel-sequence rows.
    ///
    /// Each row is `[time, s1..s12, speed, start, end]` with `time` in
    /// hundredths of a second.  `speed` of `-1` means "no limit"; a missing
    /// `start`/`end` defaults to servos 1 and 12.
    pub fn from_shadow_rows(name: &str, rows: &[Vec<i32>]) -> Result<Self, SithError> {
        let steps = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let Some((&time, rest)) = row.split_first() else {
                    return Err(step_error(index, "empty row"));
                };
                let time_ms = u64::try_from(time)
                    .map_err(|_| step_error(index, format!("negative time {time}")))?
                    * 10;
                let servo_positions: Vec<i32> = rest.iter().take(12).copied().collect();
                let column = |i: usize| row.get(i).copied();
                let channel = |i: usize, default: usize| match column(i) {
                    Some(value) => usize::try_from(value)
                        .map_err(|_| step_error(index, format!("negative servo number {value}"))),
                    None => Ok(default),
                };
                Ok(StepDocument {
                    time_ms,
                    speed: column(13).filter(|&speed| speed != -1),
                    start_servo: Some(channel(14, 1)?),
                    end_servo: Some(channel(15, servo_positions.len().min(12))?),
                    servo_positions,
                    description: format!("Step {}", index + 1),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_document(PlanDocument {
            name: name.to_string(),
            description: format!("Converted from MarcDuino sequence {name}"),
            steps,
        })
    }

    /// JSON schema of [`PlanDocument`], for editors and front ends.
    pub fn document_schema() -> serde_json::Value {
        serde_json::to_value(schema_for!(PlanDocument)).unwrap_or(serde_json::Value::Null)
    }
}

fn step_error(index: usize, reason: impl std::fmt::Display) -> SithError {
    SithError::SequenceLoad(format!("step {}: {reason}", index + 1))
}

fn validate_step(index: usize, step: StepDocument) -> Result<SequenceStep, SithError> {
    let start = step.start_servo.unwrap_or(1);
    if start == 0 {
        return Err(step_error(index, "start_servo is 1-based"));
    }
    if let Some(end) = step.end_servo {
        if end < start {
            return Err(step_error(
                index,
                format!("end_servo {end} before start_servo {start}"),
            ));
        }
        if end > step.servo_positions.len() {
            return Err(step_error(
                index,
                format!(
                    "end_servo {end} beyond the {} servo positions given",
                    step.servo_positions.len()
                ),
            ));
        }
    }
    if let Some(bad) = step.servo_positions.iter().find(|&&p| p < pulse::NO_PULSE) {
        return Err(step_error(index, format!("invalid servo position {bad}")));
    }
    Ok(SequenceStep {
        offset_ms: step.time_ms,
        channel_values: step.servo_positions,
        speed_limit: step.speed,
        channel_range: ChannelRange {
            start,
            end: step.end_servo,
        },
        label: step.description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const WAVE_JSON: &str = r#"{
        "name": "wave",
        "description": "two panels",
        "steps": [
            { "time_ms": 100, "servo_positions": [2000, 2000] },
            { "time_ms": 200, "servo_positions": [1000, 2000], "speed": 10 },
            { "time_ms": 0, "servo_positions": [-1, -1], "start_servo": 2, "end_servo": 2 }
        ]
    }"#;

    #[test]
    fn json_document_loads() {
        let plan = SequencePlan::from_json(WAVE_JSON).unwrap();
        assert_eq!(plan.name(), "wave");
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.steps()[1].speed_limit, Some(10));
        assert_eq!(plan.steps()[0].channel_range, ChannelRange::default());
        assert_eq!(
            plan.steps()[2].channel_range,
            ChannelRange {
                start: 2,
                end: Some(2)
            }
        );
    }

    #[test]
    fn toml_document_loads() {
        let raw = r#"
            name = "blink"

            [[steps]]
            time_ms = 50
            servo_positions = [1750, -1]
            description = "half open"
        "#;
        let plan = SequencePlan::from_toml(raw).unwrap();
        assert_eq!(plan.description(), "");
        assert_eq!(plan.steps()[0].channel_values, vec![1750, -1]);
        assert_eq!(plan.steps()[0].label, "half open");
    }

    #[test]
    fn structural_errors_are_sequence_load_errors() {
        let cases = [
            r#"{"name":"x","steps":[{"time_ms":-5,"servo_positions":[1000]}]}"#,
            r#"{"name":"x","steps":[{"servo_positions":[1000]}]}"#,
            r#"{"name":"x","steps":[{"time_ms":5,"servo_positions":[1000],"start_servo":0}]}"#,
            r#"{"name":"x","steps":[{"time_ms":5,"servo_positions":[1000,1000],"start_servo":2,"end_servo":1}]}"#,
            r#"{"name":"x","steps":[{"time_ms":5,"servo_positions":[1000],"end_servo":3}]}"#,
            r#"{"name":"x","steps":[{"time_ms":5,"servo_positions":[-7]}]}"#,
            "not json",
        ];
        for raw in cases {
            assert!(
                matches!(SequencePlan::from_json(raw), Err(SithError::SequenceLoad(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn load_file_picks_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wave.json");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(WAVE_JSON.as_bytes())
            .unwrap();
        assert_eq!(SequencePlan::load_file(&path).unwrap().len(), 3);

        let yaml = dir.path().join("wave.yaml");
        std::fs::write(&yaml, "name: wave").unwrap();
        assert!(matches!(
            SequencePlan::load_file(&yaml),
            Err(SithError::SequenceLoad(_))
        ));
        assert!(SequencePlan::load_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn shadow_rows_convert() {
        let rows = vec![
            vec![30, 1000, 1000, 1000, 1000, 1000, 1000, 1000, 1000, 1000, 1000, 1000, 1000, -1, 1, 12],
            vec![150, 2000, 2000, 2000, 2000, 2000, 2000, 2000, 2000, 2000, 2000, 2000, 2000, 5, 3, 4],
            vec![0, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1],
        ];
        let plan = SequencePlan::from_shadow_rows("open_close", &rows).unwrap();
        let steps = plan.steps();
        assert_eq!(steps[0].offset_ms, 300);
        assert_eq!(steps[0].speed_limit, None);
        assert_eq!(steps[0].channel_values.len(), 12);
        assert_eq!(steps[1].offset_ms, 1500);
        assert_eq!(steps[1].speed_limit, Some(5));
        assert_eq!(
            steps[1].channel_range,
            ChannelRange {
                start: 3,
                end: Some(4)
            }
        );
        assert_eq!(
            steps[2].channel_range,
            ChannelRange {
                start: 1,
                end: Some(12)
            }
        );
        assert_eq!(steps[2].label, "Step 3");

        assert!(SequencePlan::from_shadow_rows("bad", &[vec![]]).is_err());
        assert!(SequencePlan::from_shadow_rows("bad", &[vec![-3, 1000]]).is_err());
    }

    #[test]
    fn channel_range_membership() {
        let open = ChannelRange::default();
        assert!(open.contains(1) && open.contains(99));
        assert!(!open.contains(0));
        let window = ChannelRange {
            start: 2,
            end: Some(3),
        };
        assert!(!window.contains(1));
        assert!(window.contains(3));
        assert!(!window.contains(4));
    }

    #[test]
    fn schema_lists_step_fields() {
        let schema = SequencePlan::document_schema().to_string();
        assert!(schema.contains("servo_positions"));
        assert!(schema.contains("time_ms"));
    }
}
