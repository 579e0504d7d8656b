//! Insight generation: natural-language narratives for structural units.
//!
//! The only component that talks to the generation service. Units are
//! rendered as fact sheets, packed into size-bounded batches and sent with
//! bounded concurrency. A batch that keeps failing degrades to placeholder
//! text instead of failing the run.

pub mod batch;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::InsightConfig;
use crate::context::ServiceContext;
use crate::parse::{StructuralModel, UnitId};
use crate::ports::llm::CompletionRequest;

pub use batch::Batch;

/// Text given to units whose batch could not be generated.
pub const PLACEHOLDER: &str = "No generated insight is available for this unit.";

const INSTRUCTIONS: &str = "You are documenting a software repository. For each numbered \
unit below, write a short paragraph (two to four sentences) explaining what it does and how it \
relates to the units it references. Use only the facts given; do not speculate.\n\n\
Respond with JSON only, in exactly this shape:\n\
{\"units\": [{\"index\": <number>, \"insight\": \"<paragraph>\"}]}\n";

/// Narrative attached to one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    /// The narrative.
    pub text: String,
    /// `true` when the text is [`PLACEHOLDER`] rather than generated.
    pub placeholder: bool,
}

impl Insight {
    fn placeholder() -> Self {
        Self { text: PLACEHOLDER.to_string(), placeholder: true }
    }
}

/// Outcome of the insight stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsightReport {
    /// Narrative per described unit.
    pub insights: BTreeMap<UnitId, Insight>,
    /// Batches attempted.
    pub batches: usize,
    /// Batches that exhausted their attempts. Each counts as one
    /// generation-degraded warning.
    pub failed_batches: usize,
    /// Units beyond `max_units` that were not described.
    pub omitted_units: usize,
    /// Prompt tokens reported by the service.
    pub prompt_tokens: u64,
    /// Completion tokens reported by the service.
    pub completion_tokens: u64,
}

impl InsightReport {
    /// `true` when batches existed and none of them succeeded.
    #[must_use]
    pub const fn is_total_outage(&self) -> bool {
        self.batches > 0 && self.failed_batches == self.batches
    }
}

#[derive(Deserialize)]
struct BatchResponse {
    units: Vec<UnitInsight>,
}

#[derive(Deserialize)]
struct UnitInsight {
    index: usize,
    insight: String,
}

/// Generates narratives for the units of `model`, within `budget`.
///
/// Never fails: exhausted batches are reported through
/// [`InsightReport::failed_batches`] and the caller decides whether that
/// is fatal.
pub async fn generate(
    ctx: &ServiceContext,
    model: &StructuralModel,
    budget: &InsightConfig,
) -> InsightReport {
    let total = model.unit_count();
    let sheets: Vec<(UnitId, String)> = model
        .files
        .values()
        .flat_map(|file| file.units.iter().map(move |unit| (file, unit)))
        .take(budget.max_units)
        .map(|(file, unit)| (unit.id.clone(), batch::fact_sheet(model, &file.path, unit)))
        .collect();
    let mut report =
        InsightReport { omitted_units: total - sheets.len(), ..InsightReport::default() };

    let batches = batch::pack(sheets, budget.max_batch_chars);
    report.batches = batches.len();
    info!(units = total - report.omitted_units, batches = batches.len(), "generating insights");

    let outcomes: Vec<(usize, Result<BatchOutcome, String>)> =
        stream::iter(batches.iter().enumerate())
            .map(|(i, b)| async move { (i, run_batch(ctx, b, budget).await) })
            .buffer_unordered(budget.concurrency.max(1))
            .collect()
            .await;

    for (i, outcome) in outcomes {
        let batch = &batches[i];
        match outcome {
            Ok(mut done) => {
                report.prompt_tokens += u64::from(done.prompt_tokens);
                report.completion_tokens += u64::from(done.completion_tokens);
                for (index, id) in batch.units.iter().enumerate() {
                    let insight = match done.insights.remove(&index) {
                        Some(text) => Insight { text, placeholder: false },
                        None => Insight::placeholder(),
                    };
                    report.insights.insert(id.clone(), insight);
                }
            }
            Err(error) => {
                warn!(batch = i, units = batch.units.len(), %error, "generation degraded");
                report.failed_batches += 1;
                for id in &batch.units {
                    report.insights.insert(id.clone(), Insight::placeholder());
                }
            }
        }
    }
    report
}

struct BatchOutcome {
    insights: BTreeMap<usize, String>,
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Builds the user turn for one batch; units are numbered by position.
fn build_prompt(batch: &Batch) -> String {
    let mut prompt = String::from("Units to describe:\n");
    for (index, sheet) in batch.sheets.iter().enumerate() {
        let _ = write!(prompt, "\n[{index}]\n{sheet}");
    }
    prompt
}

/// Sends one batch, retrying with exponential backoff.
async fn run_batch(
    ctx: &ServiceContext,
    batch: &Batch,
    budget: &InsightConfig,
) -> Result<BatchOutcome, String> {
    let request = CompletionRequest {
        model: budget.model().to_string(),
        system: INSTRUCTIONS.to_string(),
        prompt: build_prompt(batch),
        max_tokens: budget.max_tokens,
    };
    let attempts = budget.max_attempts.max(1);
    let mut delay = Duration::from_millis(budget.backoff_ms);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        let outcome =
            match tokio::time::timeout(budget.request_timeout(), ctx.llm.complete(&request)).await {
                Ok(Ok(response)) => parse_response(&response.text, batch.units.len()).map(
                    |insights| BatchOutcome {
                        insights,
                        prompt_tokens: response.prompt_tokens,
                        completion_tokens: response.completion_tokens,
                    },
                ),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("timed out after {}s", budget.request_timeout_secs)),
            };
        match outcome {
            Ok(done) => return Ok(done),
            Err(error) => {
                debug!(attempt, %error, "generation attempt failed");
                last_error = error;
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
    Err(format!("{attempts} attempt(s) failed; last error: {last_error}"))
}

/// Removes a surrounding Markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parses a batch response into narratives keyed by prompt index.
///
/// Indices outside the batch and blank narratives are ignored.
fn parse_response(text: &str, batch_len: usize) -> Result<BTreeMap<usize, String>, String> {
    let parsed: BatchResponse = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| format!("malformed generation response: {e}"))?;
    Ok(parsed
        .units
        .into_iter()
        .filter(|u| u.index < batch_len && !u.insight.trim().is_empty())
        .map(|u| (u.index, u.insight.trim().to_string()))
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::parse::{FileModel, Unit, UnitKind};
    use crate::test_support::{answer_all, context_with_llm, FakeLlm};

    fn model(files: &[(&str, &[&str])]) -> StructuralModel {
        let mut model = StructuralModel::default();
        for (path, names) in files {
            let units = names
                .iter()
                .enumerate()
                .map(|(i, name)| Unit {
                    id: UnitId::new(path, name),
                    kind: UnitKind::Function,
                    name: (*name).to_string(),
                    qualified_name: (*name).to_string(),
                    signature: format!("def {name}()"),
                    doc: None,
                    start_line: i * 3 + 1,
                    end_line: i * 3 + 2,
                    references: std::collections::BTreeSet::new(),
                })
                .collect();
            model.files.insert(
                (*path).to_string(),
                FileModel {
                    path: (*path).to_string(),
                    language: "python".into(),
                    units,
                    imports: Vec::new(),
                    partial: false,
                },
            );
        }
        model
    }

    fn budget() -> InsightConfig {
        InsightConfig { backoff_ms: 0, ..InsightConfig::default() }
    }

    /// A budget that puts each of the test units in its own batch.
    fn one_unit_per_batch() -> InsightConfig {
        InsightConfig { max_batch_chars: 70, ..budget() }
    }

    #[tokio::test]
    async fn every_unit_gets_a_generated_insight() {
        let ctx = context_with_llm(FakeLlm::new(|req| Ok(answer_all(&req.prompt))));
        let model = model(&[("a.py", &["load", "save"]), ("b.py", &["run"])]);

        let report = generate(&ctx, &model, &budget()).await;

        assert_eq!(report.batches, 1);
        assert_eq!(report.failed_batches, 0);
        assert_eq!(report.insights.len(), 3);
        assert!(report.insights.values().all(|i| !i.placeholder));
        assert!(!report.is_total_outage());
    }

    #[tokio::test]
    async fn failing_batch_degrades_to_placeholders() {
        let llm = FakeLlm::new(|req| {
            if req.prompt.contains("Unit: save") {
                Err("service unavailable".into())
            } else {
                Ok(answer_all(&req.prompt))
            }
        });
        let calls = llm.calls();
        let ctx = context_with_llm(llm);
        let model = model(&[("a.py", &["load", "save"]), ("b.py", &["run"])]);

        let report = generate(&ctx, &model, &one_unit_per_batch()).await;

        assert_eq!(report.batches, 3);
        assert_eq!(report.failed_batches, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2 + 3);
        let save = &report.insights[&UnitId::new("a.py", "save")];
        assert!(save.placeholder);
        assert_eq!(save.text, PLACEHOLDER);
        assert!(!report.insights[&UnitId::new("b.py", "run")].placeholder);
    }

    #[tokio::test]
    async fn total_outage_is_reported() {
        let ctx = context_with_llm(FakeLlm::new(|_| Err("down".into())));
        let model = model(&[("a.py", &["load", "save"])]);

        let report = generate(&ctx, &model, &one_unit_per_batch()).await;

        assert!(report.is_total_outage());
        assert_eq!(report.insights.len(), 2);
    }

    #[tokio::test]
    async fn omitted_units_get_placeholders_without_failing_the_batch() {
        let ctx = context_with_llm(FakeLlm::new(|_| {
            Ok("```json\n{\"units\": [{\"index\": 0, \"insight\": \"Loads data.\"}]}\n```".into())
        }));
        let model = model(&[("a.py", &["load", "save"])]);

        let report = generate(&ctx, &model, &budget()).await;

        assert_eq!(report.failed_batches, 0);
        assert_eq!(report.insights[&UnitId::new("a.py", "load")].text, "Loads data.");
        assert!(report.insights[&UnitId::new("a.py", "save")].placeholder);
    }

    #[tokio::test]
    async fn malformed_json_is_retried() {
        let llm = FakeLlm::new(|_| Ok("Sure! Here are your insights.".into()));
        let calls = llm.calls();
        let ctx = context_with_llm(llm);

        let report = generate(&ctx, &model(&[("a.py", &["load"])]), &budget()).await;

        assert_eq!(report.failed_batches, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn max_units_caps_described_units() {
        let ctx = context_with_llm(FakeLlm::new(|req| Ok(answer_all(&req.prompt))));
        let model = model(&[("a.py", &["a", "b", "c"]), ("b.py", &["d"])]);
        let budget = InsightConfig { max_units: 2, ..budget() };

        let report = generate(&ctx, &model, &budget).await;

        assert_eq!(report.omitted_units, 2);
        assert_eq!(report.insights.len(), 2);
        assert!(report.insights.contains_key(&UnitId::new("a.py", "b")));
    }

    #[tokio::test]
    async fn empty_model_makes_no_calls() {
        let llm = FakeLlm::new(|_| Ok(String::new()));
        let calls = llm.calls();
        let ctx = context_with_llm(llm);

        let report = generate(&ctx, &StructuralModel::default(), &budget()).await;

        assert_eq!(report.batches, 0);
        assert!(!report.is_total_outage());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn strips_fences_and_ignores_out_of_range_indices() {
        let parsed = parse_response(
            "```\n{\"units\": [{\"index\": 0, \"insight\": \" ok \"}, {\"index\": 9, \"insight\": \"x\"}]}\n```",
            2,
        )
        .unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[&0], "ok");
        assert!(parse_response("{\"unit\": []}", 1).is_err());
    }

    #[test]
    fn prompt_numbers_units() {
        let batch = Batch {
            units: vec![UnitId::new("a.py", "f"), UnitId::new("a.py", "g")],
            sheets: vec!["Unit: f\n".into(), "Unit: g\n".into()],
        };
        let prompt = build_prompt(&batch);
        assert!(prompt.contains("\n[0]\nUnit: f\n"));
        assert!(prompt.contains("\n[1]\nUnit: g\n"));
    }
}
