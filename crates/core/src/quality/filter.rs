use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::report::QualityReport;
use super::rules::{validate_entry, validate_pair, RuleConfig};
use super::{FilterResult, FilterStage, PROVISIONAL_SCORE};
use crate::config::ProcessingConfig;
use crate::dataset::{extract_pair, load_jsonl, report_path_for, write_jsonl, QaPair};
use crate::error::{FilterError, JudgeError};
use crate::judge::{Evaluation, JudgeEvaluator, JudgeSettings};
use crate::llm::LlmClient;

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct FilterRun {
    pub report: QualityReport,
    pub report_path: PathBuf,
}

struct JudgeStage {
    client: Arc<dyn LlmClient>,
    settings: JudgeSettings,
}

/// Two-stage quality filter: static rules, then batched LLM judging
pub struct QualityFilter {
    rules: RuleConfig,
    judge: Option<JudgeStage>,
}

impl QualityFilter {
    pub fn new(client: Arc<dyn LlmClient>, rules: RuleConfig, judge: JudgeSettings) -> Self {
        Self {
            rules,
            judge: Some(JudgeStage {
                client,
                settings: judge,
            }),
        }
    }

    /// A filter that never calls a model
    pub fn rules_only(rules: RuleConfig) -> Self {
        Self { rules, judge: None }
    }

    /// Filter `input` into `output` and write the report next to it.
    ///
    /// When nothing passes the rules an empty output and a report are still
    /// written, and [`FilterError::NothingPassedRules`] carries the report.
    pub async fn run(
        &self,
        input: &Path,
        output: &Path,
        config: &ProcessingConfig,
    ) -> Result<FilterRun, FilterError> {
        config.validate()?;
        let judge = self.judge.as_ref().filter(|_| !config.rules_only);
        let config = ProcessingConfig {
            rules_only: judge.is_none(),
            ..config.clone()
        };
        let model_info = judge.map(|j| j.client.model_info());

        let started = Instant::now();
        let loaded = load_jsonl(input, config.sample_size).await?;
        if loaded.entries.is_empty() {
            return Err(FilterError::EmptyInput(input.to_path_buf()));
        }
        tracing::info!(
            entries = loaded.entries.len(),
            skipped = loaded.skipped_lines.len(),
            input = %input.display(),
            "dataset loaded"
        );

        let (mut results, passed) = self.rule_stage(&loaded.entries);

        if passed.is_empty() {
            tracing::error!("no entry passed the rule filter, check the input format");
            write_jsonl(output, std::iter::empty::<&serde_json::Value>()).await?;
            let report = QualityReport::build(
                &results,
                loaded.skipped_lines,
                &config,
                model_info,
                started.elapsed(),
            );
            report.write(&report_path_for(output)).await?;
            return Err(FilterError::NothingPassedRules {
                report: Box::new(report),
            });
        }

        if let Some(judge) = judge {
            let evaluations = judge_stage(judge, passed, &config).await?;
            merge_evaluations(&mut results, &evaluations, config.min_score);
        }

        let kept = loaded
            .entries
            .iter()
            .zip(&results)
            .filter(|(_, result)| result.kept)
            .map(|(entry, _)| entry);
        let written = write_jsonl(output, kept).await?;

        let report = QualityReport::build(
            &results,
            loaded.skipped_lines,
            &config,
            model_info,
            started.elapsed(),
        );
        let report_path = report_path_for(output);
        report.write(&report_path).await?;

        tracing::info!(
            kept = written,
            total = results.len(),
            retention = %format!("{:.1}%", report.summary.retention_rate_percent),
            elapsed_secs = %format!("{:.1}", report.summary.processing_time_seconds),
            output = %output.display(),
            "quality filter finished"
        );

        Ok(FilterRun {
            report,
            report_path,
        })
    }

    fn rule_stage(&self, entries: &[serde_json::Value]) -> (Vec<FilterResult>, Vec<(usize, QaPair)>) {
        let started = Instant::now();
        let mut results = Vec::with_capacity(entries.len());
        let mut passed = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            let pair = extract_pair(entry).ok();
            let verdict = match &pair {
                Some(pair) => validate_pair(pair, &self.rules),
                None => validate_entry(entry, &self.rules),
            };
            if verdict.passed {
                if let Some(pair) = pair {
                    passed.push((index, pair));
                }
            }
            results.push(FilterResult {
                index,
                kept: verdict.passed,
                score: if verdict.passed { PROVISIONAL_SCORE } else { 0 },
                reason: verdict.reason,
                stage: FilterStage::RuleFilter,
                stats: verdict.stats,
            });
        }

        tracing::info!(
            passed = passed.len(),
            total = entries.len(),
            pass_rate = %format!("{:.1}%", passed.len() as f64 / entries.len().max(1) as f64 * 100.0),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rule filter done"
        );
        (results, passed)
    }
}

/// Score every passed entry with at most `max_workers` batches in flight
async fn judge_stage(
    judge: &JudgeStage,
    passed: Vec<(usize, QaPair)>,
    config: &ProcessingConfig,
) -> Result<HashMap<usize, Evaluation>, FilterError> {
    let total = passed.len();
    let evaluator = Arc::new(JudgeEvaluator::new(
        judge.client.clone(),
        judge.settings.clone(),
        config.min_score,
    ));
    let semaphore = Arc::new(Semaphore::new(config.max_workers));
    let completed = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();

    let mut batches: Vec<Vec<(usize, QaPair)>> = Vec::new();
    let mut remaining = passed.into_iter().peekable();
    while remaining.peek().is_some() {
        batches.push(remaining.by_ref().take(config.batch_size).collect());
    }
    tracing::info!(entries = total, batches = batches.len(), workers = config.max_workers, "judge stage started");

    let mut join_set = JoinSet::new();
    for (batch_id, batch) in batches.into_iter().enumerate() {
        let evaluator = evaluator.clone();
        let semaphore = semaphore.clone();
        let completed = completed.clone();

        join_set.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| JudgeError::Cancelled { batch_id })?;
            let evaluations = evaluator.evaluate_batch(batch_id, &batch).await?;

            let done = completed.fetch_add(batch.len(), Ordering::SeqCst) + batch.len();
            let secs = started.elapsed().as_secs_f64();
            let rate = if secs > 0.0 { done as f64 / secs } else { 0.0 };
            tracing::info!(
                batch_id,
                done,
                total,
                rate = %format!("{:.1}/s", rate),
                "judge progress"
            );
            Ok::<_, JudgeError>(evaluations)
        });
    }

    let mut evaluations = HashMap::with_capacity(total);
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(batch)) => evaluations.extend(batch),
            Ok(Err(e)) => {
                join_set.abort_all();
                return Err(FilterError::Judge(e));
            }
            Err(e) => {
                join_set.abort_all();
                return Err(FilterError::Worker(e.to_string()));
            }
        }
    }

    tracing::info!(
        elapsed_secs = %format!("{:.1}", started.elapsed().as_secs_f64()),
        "judge stage done"
    );
    Ok(evaluations)
}

/// Fold judge evaluations into the rule results of entries that passed the rules
fn merge_evaluations(results: &mut [FilterResult], evaluations: &HashMap<usize, Evaluation>, min_score: u8) {
    for result in results.iter_mut().filter(|r| r.kept) {
        result.stage = FilterStage::JudgeEvaluation;
        match evaluations.get(&result.index) {
            Some(evaluation) => {
                let score = evaluation.score.unwrap_or(0);
                result.score = score;
                result.kept = evaluation.keep && score >= min_score;
                result.reason = evaluation.reason.clone();
            }
            None => {
                result.score = 0;
                result.kept = false;
                result.reason = "缺少评估结果".to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::llm::ScriptedLlm;
    use crate::quality::FilterStats;
    use serde_json::json;
    use tempfile::tempdir;

    const GOOD_ANSWER: &str =
        "我们酒店的早餐供应时间是每天早上6:30到10:00，周末延长到10:30。早餐在一楼餐厅提供。";

    fn good_entry(question: &str) -> serde_json::Value {
        json!({"contents": [
            {"role": "user", "parts": [{"text": question}]},
            {"role": "model", "parts": [{"text": GOOD_ANSWER}]}
        ]})
    }

    async fn write_input(path: &Path, entries: &[serde_json::Value]) {
        write_jsonl(path, entries).await.unwrap();
    }

    fn fast_judge() -> JudgeSettings {
        JudgeSettings {
            retry_backoff_ms: 1,
            ..JudgeSettings::default()
        }
    }

    fn passed_result(index: usize) -> FilterResult {
        FilterResult {
            index,
            kept: true,
            score: PROVISIONAL_SCORE,
            reason: "通过规则检查".into(),
            stage: FilterStage::RuleFilter,
            stats: FilterStats::default(),
        }
    }

    #[test]
    fn test_merge_applies_threshold() {
        let mut results = vec![passed_result(0), passed_result(1), passed_result(2)];
        results.push(FilterResult {
            kept: false,
            score: 0,
            ..passed_result(3)
        });
        let evaluations: HashMap<usize, Evaluation> = [
            (0, Evaluation { score: Some(8), keep: true, reason: "a".into() }),
            (1, Evaluation { score: Some(6), keep: true, reason: "b".into() }),
        ]
        .into_iter()
        .collect();

        merge_evaluations(&mut results, &evaluations, 7);

        assert!(results[0].kept);
        assert_eq!(results[0].stage, FilterStage::JudgeEvaluation);
        assert!(!results[1].kept, "score below min_score is dropped even with keep=true");
        assert!(!results[2].kept);
        assert_eq!(results[2].score, 0);
        assert_eq!(results[3].stage, FilterStage::RuleFilter);
    }

    #[tokio::test]
    async fn test_run_keeps_high_scores_in_input_order() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("raw.jsonl");
        let output = dir.path().join("filtered.jsonl");
        write_input(
            &input,
            &[
                good_entry("酒店早餐几点开始供应？"),
                json!({"contents": [{"parts": [{"text": "你好"}]}, {"parts": [{"text": "你好"}]}]}),
                good_entry("请问酒店早餐在哪里吃？"),
                good_entry("酒店早餐包含哪些品种？"),
            ],
        )
        .await;

        let llm = Arc::new(ScriptedLlm::new(vec![Ok(
            r#"[{"score":9,"keep":true},{"score":5,"keep":false},{"score":8,"keep":true}]"#
                .to_string(),
        )]));
        let filter = QualityFilter::new(llm.clone(), RuleConfig::default(), fast_judge());
        let run = filter
            .run(&input, &output, &ProcessingConfig::default())
            .await
            .unwrap();

        assert_eq!(llm.calls(), 1);
        assert_eq!(run.report.summary.total_entries, 4);
        assert_eq!(run.report.summary.high_quality_entries, 2);
        assert_eq!(run.report.stage_statistics.rule_filter_failed, 1);
        assert_eq!(run.report.stage_statistics.rule_filter_passed, 3);
        assert_eq!(run.report.stage_statistics.ai_evaluation_failed, 1);
        assert_eq!(run.report.stage_statistics.ai_evaluation_passed, 2);
        assert_eq!(run.report_path, dir.path().join("filtered_quality_report.json"));
        assert!(run.report_path.exists());

        let kept = load_jsonl(&output, None).await.unwrap().entries;
        assert_eq!(kept, vec![good_entry("酒店早餐几点开始供应？"), good_entry("酒店早餐包含哪些品种？")]);
    }

    #[tokio::test]
    async fn test_run_batches_respect_batch_size() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("raw.jsonl");
        let output = dir.path().join("filtered.jsonl");
        let entries: Vec<_> = (0..5).map(|i| good_entry(&format!("酒店早餐第{}问是什么？", i))).collect();
        write_input(&input, &entries).await;

        let llm = Arc::new(ScriptedLlm::responding(|prompt| {
            let count = prompt.matches("\nA: ").count();
            Ok(format!("[{}]", vec![r#"{"score":8}"#; count].join(",")))
        }));
        let filter = QualityFilter::new(llm.clone(), RuleConfig::default(), fast_judge());
        let config = ProcessingConfig {
            batch_size: 2,
            max_workers: 2,
            ..ProcessingConfig::default()
        };
        let run = filter.run(&input, &output, &config).await.unwrap();

        assert_eq!(llm.calls(), 3);
        assert_eq!(run.report.summary.high_quality_entries, 5);
    }

    #[tokio::test]
    async fn test_blocked_batch_does_not_discard_others() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("raw.jsonl");
        let output = dir.path().join("filtered.jsonl");
        let entries: Vec<_> = (0..4).map(|i| good_entry(&format!("酒店早餐第{}问是什么？", i))).collect();
        write_input(&input, &entries).await;

        // the batch holding the first question never gets any text back
        let llm = Arc::new(ScriptedLlm::responding(|prompt| {
            if prompt.contains("第0问") {
                Err(ApiError::EmptyResponse)
            } else {
                Ok(r#"[{"score":9},{"score":9}]"#.to_string())
            }
        }));
        let filter = QualityFilter::new(llm.clone(), RuleConfig::default(), fast_judge());
        let config = ProcessingConfig {
            batch_size: 2,
            ..ProcessingConfig::default()
        };
        let run = filter.run(&input, &output, &config).await.unwrap();

        assert_eq!(llm.calls(), 3);
        assert_eq!(run.report.summary.high_quality_entries, 2);
        assert_eq!(run.report.stage_statistics.ai_evaluation_failed, 2);
        let kept = load_jsonl(&output, None).await.unwrap().entries;
        assert_eq!(kept, entries[2..].to_vec());
    }

    #[tokio::test]
    async fn test_api_failure_aborts_run() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("raw.jsonl");
        let output = dir.path().join("filtered.jsonl");
        write_input(&input, &[good_entry("酒店早餐几点开始供应？")]).await;

        let llm = Arc::new(ScriptedLlm::responding(|_| {
            Err(ApiError::Status {
                status: 400,
                body: "bad request".into(),
            })
        }));
        let filter = QualityFilter::new(llm, RuleConfig::default(), fast_judge());
        let err = filter
            .run(&input, &output, &ProcessingConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, FilterError::Judge(JudgeError::Api { batch_id: 0, .. })));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_nothing_passes_rules() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("raw.jsonl");
        let output = dir.path().join("filtered.jsonl");
        write_input(
            &input,
            &[json!({"question": "天气如何", "answer": "晴"})],
        )
        .await;

        let llm = Arc::new(ScriptedLlm::new(Vec::new()));
        let filter = QualityFilter::new(llm.clone(), RuleConfig::default(), fast_judge());
        let err = filter
            .run(&input, &output, &ProcessingConfig::default())
            .await
            .unwrap_err();

        match err {
            FilterError::NothingPassedRules { report } => {
                assert_eq!(report.summary.total_entries, 1);
                assert_eq!(report.summary.high_quality_entries, 0);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(llm.calls(), 0);
        assert_eq!(tokio::fs::read_to_string(&output).await.unwrap(), "");
        assert!(dir.path().join("filtered_quality_report.json").exists());
    }

    #[tokio::test]
    async fn test_rules_only_mode() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("raw.jsonl");
        let output = dir.path().join("filtered.jsonl");
        write_input(
            &input,
            &[good_entry("酒店早餐几点开始供应？"), json!({"question": "hi", "answer": "hi"})],
        )
        .await;

        let run = QualityFilter::rules_only(RuleConfig::default())
            .run(&input, &output, &ProcessingConfig::default())
            .await
            .unwrap();

        assert!(run.report.configuration.rules_only);
        assert!(run.report.configuration.model_info.is_none());
        assert_eq!(run.report.stage_statistics.rule_filter_passed, 1);
        assert_eq!(run.report.summary.high_quality_entries, 1);
        assert_eq!(load_jsonl(&output, None).await.unwrap().entries.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("raw.jsonl");
        tokio::fs::write(&input, "\n\n").await.unwrap();

        let err = QualityFilter::rules_only(RuleConfig::default())
            .run(&input, &dir.path().join("out.jsonl"), &ProcessingConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FilterError::EmptyInput(_)));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_io() {
        let config = ProcessingConfig {
            batch_size: 0,
            ..ProcessingConfig::default()
        };
        let err = QualityFilter::rules_only(RuleConfig::default())
            .run(Path::new("/nonexistent.jsonl"), Path::new("/tmp/out.jsonl"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, FilterError::Config(_)));
    }
}
