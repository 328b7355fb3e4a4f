//! Output Collector (§4.6 step 3, §6 "side-channel output tool").
//!
//! The upstream system exposes `report_outputs` to the agent as a literal
//! tool call; here it is modeled as a typed sink the runtime adapters write
//! through, so the Stage Executor never has to parse tool-call transcripts.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

/// Where a runtime adapter deposits a stage's structured outputs as it
/// reports them. A well-behaved adapter calls [`OutputSink::report`] once
/// per invocation with the last-seen `outputs` map; harvesting which call
/// is "last" is the adapter's responsibility, not the sink's.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn report(&self, stage_name: &str, outputs: HashMap<String, Value>);

    /// The most recently reported outputs for a stage, if any were reported.
    async fn take(&self, stage_name: &str) -> Option<HashMap<String, Value>>;
}

/// In-memory sink good enough for the in-process runtime adapters and for
/// tests; keeps only the latest report per stage (§6 "harvests its last
/// invocation's outputs argument").
#[derive(Default)]
pub struct InMemoryOutputSink {
    reports: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl InMemoryOutputSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutputSink for InMemoryOutputSink {
    async fn report(&self, stage_name: &str, outputs: HashMap<String, Value>) {
        self.reports
            .lock()
            .await
            .insert(stage_name.to_string(), outputs);
    }

    async fn take(&self, stage_name: &str) -> Option<HashMap<String, Value>> {
        self.reports.lock().await.remove(stage_name)
    }
}

/// Render the instruction block advertising a stage's `outputKeys` to the
/// agent (§4.6 step 3 "expected-output-key instruction block"). Returns an
/// empty string when the stage declares no output keys.
pub fn render_output_instructions(output_keys: &[String]) -> String {
    if output_keys.is_empty() {
        return String::new();
    }
    let keys = output_keys
        .iter()
        .map(|k| format!("- {k}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Before finishing, call `report_outputs` with the following keys:\n{keys}\n\
         Missing keys are permitted but will be noted in the run log."
    )
}

/// Output keys declared on the stage that the reported `extractedData` did
/// not include — not an error (§6), just surfaced to logs by the caller.
pub fn missing_keys(output_keys: &[String], extracted: &HashMap<String, Value>) -> Vec<String> {
    output_keys
        .iter()
        .filter(|k| !extracted.contains_key(k.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_output_keys_renders_nothing() {
        assert_eq!(render_output_instructions(&[]), "");
    }

    #[test]
    fn renders_one_bullet_per_key() {
        let rendered = render_output_instructions(&["score".to_string(), "summary".to_string()]);
        assert!(rendered.contains("- score"));
        assert!(rendered.contains("- summary"));
    }

    #[test]
    fn missing_keys_reports_only_absent_ones() {
        let mut extracted = HashMap::new();
        extracted.insert("score".to_string(), Value::from(1));
        let missing = missing_keys(&["score".to_string(), "summary".to_string()], &extracted);
        assert_eq!(missing, vec!["summary".to_string()]);
    }

    #[tokio::test]
    async fn sink_keeps_only_the_latest_report_per_stage() {
        let sink = InMemoryOutputSink::new();
        let mut first = HashMap::new();
        first.insert("score".to_string(), Value::from(1));
        sink.report("plan", first).await;
        let mut second = HashMap::new();
        second.insert("score".to_string(), Value::from(2));
        sink.report("plan", second).await;

        let taken = sink.take("plan").await.unwrap();
        assert_eq!(taken.get("score"), Some(&Value::from(2)));
        assert!(sink.take("plan").await.is_none());
    }
}
