use chrono::{DateTime, Local, TimeZone, Utc};

use framing_core::config::EvalConfig;
use framing_core::error::{FramingError, Result};
use framing_core::message::Message;
use framing_core::model::{CallOptions, ChatModel};

use crate::output;
use crate::pairs::PromptPair;
use crate::record::{FramingType, ResultRecord};
use crate::report::EvalReport;

const PREVIEW_CHARS: usize = 60;

/// Lifecycle of a runner. There is no paused state: a batch is either
/// fully processed and persisted, or nothing is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Processing,
    Done,
}

/// Runs every prompt pair through a model, one call at a time, and
/// persists the batch once at the end.
pub struct EvalRunner {
    config: EvalConfig,
    state: RunState,
}

impl EvalRunner {
    pub fn new(config: EvalConfig) -> Self {
        Self {
            config,
            state: RunState::Idle,
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Evaluate `pairs` against `model` and write the JSON and CSV artifacts.
    ///
    /// Produces exactly two records per pair, neutral then invested, in
    /// source order. Call failures are recorded as error markers and never
    /// abort the run. The output directory is checked before the first
    /// call, so an unusable destination fails the run with nothing sent.
    /// A runner executes a single batch.
    pub async fn run(&mut self, model: &dyn ChatModel, pairs: &[PromptPair]) -> Result<EvalReport> {
        if self.state != RunState::Idle {
            return Err(FramingError::Other(format!(
                "runner is {:?}; start a new runner for another batch",
                self.state
            )));
        }

        let run_stamp = format_run_stamp(&Local::now());
        let model_id = model.model_name().to_string();
        tracing::info!(
            pairs = pairs.len(),
            model = %model_id,
            run = %run_stamp,
            "starting evaluation"
        );

        output::prepare_dir(&self.config.output_dir)?;

        self.state = RunState::Processing;
        let (records, failed_calls) = self.collect(model, pairs).await;
        let persisted = output::write_batch(&self.config.output_dir, &run_stamp, &model_id, &records);
        self.state = RunState::Done;

        let artifacts = match persisted {
            Ok(artifacts) => artifacts,
            Err(e) => {
                tracing::error!(records = records.len(), error = %e, "failed to persist batch");
                return Err(e);
            }
        };

        tracing::info!(
            records = records.len(),
            errors = failed_calls,
            json = %artifacts.json_path.display(),
            csv = %artifacts.csv_path.display(),
            "evaluation complete"
        );

        Ok(EvalReport {
            run_stamp,
            model: model_id,
            records,
            failed_calls,
            artifacts,
        })
    }

    async fn collect(
        &self,
        model: &dyn ChatModel,
        pairs: &[PromptPair],
    ) -> (Vec<ResultRecord>, usize) {
        let options = self.config.call_options();
        let model_id = model.model_name();
        let total = pairs.len();
        let mut records = Vec::with_capacity(total * 2);
        let mut failed = 0;

        for (i, pair) in pairs.iter().enumerate() {
            tracing::info!(
                category = %pair.category,
                base_question = %preview(&pair.base_question),
                "[{}/{}] Processing: {}",
                i + 1,
                total,
                pair.id
            );
            for framing in FramingType::ORDER {
                let (record, ok) = call_once(model, model_id, &options, pair, framing).await;
                if !ok {
                    failed += 1;
                }
                records.push(record);
            }
        }
        (records, failed)
    }
}

/// Single attempt for one framing of one pair. The flag is false when the
/// call failed.
async fn call_once(
    model: &dyn ChatModel,
    model_id: &str,
    options: &CallOptions,
    pair: &PromptPair,
    framing: FramingType,
) -> (ResultRecord, bool) {
    let messages = [Message::user(pair.framing(framing))];
    let timestamp = Utc::now();
    tracing::debug!(prompt_id = %pair.id, %framing, "sending prompt");

    let outcome = model.generate(&messages, options).await;
    if let Err(e) = &outcome {
        tracing::warn!(prompt_id = %pair.id, %framing, error = %e, "model call failed; recording error");
    }
    let record = ResultRecord::from_outcome(pair, framing, timestamp, model_id, &outcome);
    (record, outcome.is_ok())
}

/// `YYYYMMDD_HHMMSS`, used to name the artifacts of a run.
pub fn format_run_stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d_%H%M%S").to_string()
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use framing_core::error::ModelError;
    use framing_core::model::ChatResult;

    use crate::output::{read_csv, read_json};

    /// Answers every prompt with a fixed text and records what it was sent.
    struct FixedModel {
        reply: String,
        seen: Mutex<Vec<(String, Option<u32>)>>,
    }

    impl FixedModel {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.into(),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.seen.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
        }
    }

    #[async_trait]
    impl ChatModel for FixedModel {
        async fn generate(&self, messages: &[Message], options: &CallOptions) -> Result<ChatResult> {
            self.seen
                .lock()
                .unwrap()
                .push((messages[0].content().to_string(), options.max_tokens));
            Ok(ChatResult {
                message: Message::ai(self.reply.clone()),
                usage: None,
            })
        }

        fn model_name(&self) -> &str {
            "fixed-model"
        }
    }

    /// Fails every call, as an unreachable service would.
    struct DownModel;

    #[async_trait]
    impl ChatModel for DownModel {
        async fn generate(&self, _messages: &[Message], _options: &CallOptions) -> Result<ChatResult> {
            Err(ModelError::ApiRequest("connection refused".into()).into())
        }

        fn model_name(&self) -> &str {
            "down-model"
        }
    }

    /// Fails any prompt containing "boom", echoes the rest.
    struct FlakyModel;

    #[async_trait]
    impl ChatModel for FlakyModel {
        async fn generate(&self, messages: &[Message], _options: &CallOptions) -> Result<ChatResult> {
            let prompt = messages[0].content();
            if prompt.contains("boom") {
                return Err(ModelError::InvalidResponse("garbled".into()).into());
            }
            Ok(ChatResult {
                message: Message::ai(format!("echo: {prompt}")),
                usage: None,
            })
        }

        fn model_name(&self) -> &str {
            "flaky-model"
        }
    }

    fn pair(id: &str, neutral: &str, invested: &str) -> PromptPair {
        PromptPair {
            id: id.into(),
            category: "cat".into(),
            base_question: format!("question {id}"),
            neutral_framing: neutral.into(),
            invested_framing: invested.into(),
        }
    }

    fn runner_in(dir: &tempfile::TempDir) -> EvalRunner {
        EvalRunner::new(EvalConfig::new().with_output_dir(dir.path()))
    }

    #[tokio::test]
    async fn single_pair_always_ok() {
        let dir = tempfile::tempdir().unwrap();
        let model = FixedModel::new("OK");
        let mut runner = runner_in(&dir);
        let pairs = vec![pair("p1", "neutral text", "invested text")];

        let report = runner.run(&model, &pairs).await.unwrap();

        assert_eq!(report.records.len(), 2);
        assert!(report.records.iter().all(|r| r.response == "OK"));
        assert_eq!(report.records[0].framing_type, FramingType::Neutral);
        assert_eq!(report.records[1].framing_type, FramingType::Invested);
        assert_eq!(report.records[0].prompt_id, report.records[1].prompt_id);
        assert_eq!(report.records[0].full_prompt, "neutral text");
        assert_eq!(report.records[1].full_prompt, "invested text");
        assert_eq!(report.model, "fixed-model");
        assert!(report.records.iter().all(|r| r.model_identifier == "fixed-model"));
        assert!(report.artifacts.json_path.exists());
        assert!(report.artifacts.csv_path.exists());
        assert_eq!(runner.state(), RunState::Done);
    }

    #[tokio::test]
    async fn calls_are_sequential_neutral_first() {
        let dir = tempfile::tempdir().unwrap();
        let model = FixedModel::new("OK");
        let pairs = vec![pair("a", "a-n", "a-i"), pair("b", "b-n", "b-i")];

        let report = runner_in(&dir).run(&model, &pairs).await.unwrap();

        assert_eq!(model.prompts(), vec!["a-n", "a-i", "b-n", "b-i"]);
        let ids: Vec<&str> = report.records.iter().map(|r| r.prompt_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "a", "b", "b"]);
        assert!(report.records[0].timestamp <= report.records[1].timestamp);
        assert!(report.records[1].timestamp <= report.records[2].timestamp);
    }

    #[tokio::test]
    async fn output_budget_passed_to_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = FixedModel::new("OK");
        let mut runner = EvalRunner::new(
            EvalConfig::new()
                .with_output_dir(dir.path())
                .with_max_tokens(77),
        );
        runner.run(&model, &[pair("p", "n", "i")]).await.unwrap();
        assert!(model.seen.lock().unwrap().iter().all(|(_, m)| *m == Some(77)));
    }

    #[tokio::test]
    async fn empty_source_still_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let model = FixedModel::new("OK");

        let report = runner_in(&dir).run(&model, &[]).await.unwrap();

        assert!(report.records.is_empty());
        assert!(model.prompts().is_empty());
        let doc = read_json(&report.artifacts.json_path).unwrap();
        assert!(doc.results.is_empty());
        assert_eq!(doc.metadata.total_prompts, 0);
        assert!(read_csv(&report.artifacts.csv_path).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_service_degrades_to_all_errors() {
        let dir = tempfile::tempdir().unwrap();
        let pairs = vec![pair("a", "n", "i"), pair("b", "n", "i")];

        let report = runner_in(&dir).run(&DownModel, &pairs).await.unwrap();

        assert_eq!(report.records.len(), 4);
        assert_eq!(report.error_count(), 4);
        for r in &report.records {
            assert!(r.response.starts_with("ERROR:"));
            assert!(r.response.contains("connection refused"));
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_pair_or_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let pairs = vec![
            pair("a", "boom neutral", "fine invested"),
            pair("b", "fine neutral", "fine invested"),
        ];

        let report = runner_in(&dir).run(&FlakyModel, &pairs).await.unwrap();

        assert_eq!(report.records.len(), 4);
        assert_eq!(
            report.records[0].response,
            "ERROR: Model error: Invalid response: garbled"
        );
        assert_eq!(report.records[1].response, "echo: fine invested");
        assert_eq!(report.records[2].response, "echo: fine neutral");
        assert_eq!(report.error_count(), 1);
    }

    #[tokio::test]
    async fn artifacts_agree_with_returned_records() {
        let dir = tempfile::tempdir().unwrap();
        let pairs = vec![
            pair("a", "boom, \"quoted\"", "multi\nline"),
            pair("b", "plain", "boom"),
        ];

        let report = runner_in(&dir).run(&FlakyModel, &pairs).await.unwrap();

        let doc = read_json(&report.artifacts.json_path).unwrap();
        let rows = read_csv(&report.artifacts.csv_path).unwrap();
        assert_eq!(doc.results, report.records);
        assert_eq!(rows, doc.results);
        assert_eq!(doc.metadata.total_prompts, 4);
        assert_eq!(doc.metadata.model, "flaky-model");
        assert_eq!(doc.metadata.timestamp, report.run_stamp);
    }

    #[tokio::test]
    async fn runner_refuses_second_batch() {
        let dir = tempfile::tempdir().unwrap();
        let model = FixedModel::new("OK");
        let mut runner = runner_in(&dir);
        assert_eq!(runner.state(), RunState::Idle);

        runner.run(&model, &[pair("a", "n", "i")]).await.unwrap();
        let err = runner.run(&model, &[pair("b", "n", "i")]).await.unwrap_err();

        assert!(matches!(err, FramingError::Other(_)));
        assert_eq!(model.prompts().len(), 2);
    }

    #[tokio::test]
    async fn blocked_output_dir_fails_before_any_call() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("results");
        std::fs::write(&blocker, "file in the way").unwrap();
        let model = FixedModel::new("OK");
        let mut runner = EvalRunner::new(EvalConfig::new().with_output_dir(&blocker));
        let pairs = vec![pair("a", "n", "i"), pair("b", "n", "i"), pair("c", "n", "i")];

        let err = runner.run(&model, &pairs).await.unwrap_err();

        assert!(matches!(err, FramingError::Output(_)));
        assert!(model.prompts().is_empty());
        assert_eq!(runner.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn reply_that_looks_like_a_marker_is_not_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let model = FixedModel::new("ERROR: no such thing as a bad question");

        let report = runner_in(&dir).run(&model, &[pair("a", "n", "i")]).await.unwrap();

        assert_eq!(report.error_count(), 0);
        assert!(report.records.iter().all(|r| r.is_error()));
    }

    #[test]
    fn run_stamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 11, 5, 9, 7, 3).unwrap();
        assert_eq!(format_run_stamp(&at), "20241105_090703");
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(100);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
        assert_eq!(preview("short"), "short...");
    }
}
