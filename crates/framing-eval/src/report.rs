use serde::{Deserialize, Serialize};

use crate::output::BatchArtifacts;
use crate::record::ResultRecord;

/// What a finished run hands back: the batch plus where it was persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub run_stamp: String,
    pub model: String,
    pub records: Vec<ResultRecord>,
    /// Calls whose outcome was an error, counted as they happened.
    pub failed_calls: usize,
    pub artifacts: BatchArtifacts,
}

impl EvalReport {
    /// Number of pairs evaluated (two records each).
    pub fn pair_count(&self) -> usize {
        self.records.len() / 2
    }

    /// Number of calls that failed. A reply that merely starts with
    /// `ERROR:` is not counted.
    pub fn error_count(&self) -> usize {
        self.failed_calls
    }

    pub fn into_records(self) -> Vec<ResultRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FramingType;
    use chrono::Utc;
    use std::path::Path;

    fn rec(response: &str, framing: FramingType) -> ResultRecord {
        ResultRecord {
            prompt_id: "p".into(),
            category: "c".into(),
            base_question: "q".into(),
            framing_type: framing,
            full_prompt: "prompt".into(),
            response: response.into(),
            timestamp: Utc::now(),
            model_identifier: "m".into(),
        }
    }

    #[test]
    fn counts() {
        let report = EvalReport {
            run_stamp: "20250101_000000".into(),
            model: "m".into(),
            records: vec![
                rec("fine", FramingType::Neutral),
                rec("ERROR: Model error: timeout", FramingType::Invested),
            ],
            failed_calls: 1,
            artifacts: BatchArtifacts::for_stamp(Path::new("results"), "20250101_000000"),
        };
        assert_eq!(report.pair_count(), 1);
        assert_eq!(report.error_count(), 1);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("20250101_000000"));
        assert_eq!(report.into_records().len(), 2);
    }
}
