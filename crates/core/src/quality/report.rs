use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::summary::{summarize, QualitySummary};
use super::{FilterResult, FilterStage};
use crate::config::ProcessingConfig;
use crate::dataset::io::write_file;
use crate::error::DatasetError;
use crate::models::ModelInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_entries: usize,
    pub high_quality_entries: usize,
    pub low_quality_entries: usize,
    pub retention_rate_percent: f64,
    pub processing_time_seconds: f64,
    pub processing_speed_per_second: f64,
    /// 1-based line numbers that were not valid JSON
    pub skipped_lines: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfiguration {
    pub minimum_score: u8,
    pub batch_size: usize,
    pub max_workers: usize,
    pub sample_size: Option<usize>,
    pub rules_only: bool,
    pub model_info: Option<ModelInfo>,
}

/// Per-stage counts. Every entry that reached the judge passed the rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatistics {
    pub rule_filter_failed: usize,
    pub ai_evaluation_failed: usize,
    pub rule_filter_passed: usize,
    pub ai_evaluation_passed: usize,
}

impl StageStatistics {
    fn from_results(results: &[FilterResult]) -> Self {
        let mut stats = Self::default();
        for result in results {
            match (result.stage, result.kept) {
                (FilterStage::RuleFilter, false) => stats.rule_filter_failed += 1,
                (FilterStage::RuleFilter, true) => stats.rule_filter_passed += 1,
                (FilterStage::JudgeEvaluation, kept) => {
                    stats.rule_filter_passed += 1;
                    if kept {
                        stats.ai_evaluation_passed += 1;
                    } else {
                        stats.ai_evaluation_failed += 1;
                    }
                }
            }
        }
        stats
    }
}

/// The JSON report written next to the filtered output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub generated_at: DateTime<Utc>,
    pub summary: ReportSummary,
    pub configuration: ReportConfiguration,
    pub stage_statistics: StageStatistics,
    pub quality_analysis: QualitySummary,
}

impl QualityReport {
    pub fn build(
        results: &[FilterResult],
        skipped_lines: Vec<usize>,
        config: &ProcessingConfig,
        model_info: Option<ModelInfo>,
        elapsed: Duration,
    ) -> Self {
        let total_entries = results.len();
        let high_quality_entries = results.iter().filter(|r| r.kept).count();
        let seconds = elapsed.as_secs_f64();

        let retention_rate_percent = if total_entries == 0 {
            0.0
        } else {
            high_quality_entries as f64 / total_entries as f64 * 100.0
        };
        let processing_speed_per_second = if seconds > 0.0 {
            total_entries as f64 / seconds
        } else {
            0.0
        };

        Self {
            generated_at: Utc::now(),
            summary: ReportSummary {
                total_entries,
                high_quality_entries,
                low_quality_entries: total_entries - high_quality_entries,
                retention_rate_percent,
                processing_time_seconds: seconds,
                processing_speed_per_second,
                skipped_lines,
            },
            configuration: ReportConfiguration {
                minimum_score: config.min_score,
                batch_size: config.batch_size,
                max_workers: config.max_workers,
                sample_size: config.sample_size,
                rules_only: config.rules_only,
                model_info,
            },
            stage_statistics: StageStatistics::from_results(results),
            quality_analysis: summarize(results),
        }
    }

    /// Write as pretty JSON, creating parent directories
    pub async fn write(&self, path: &Path) -> Result<(), DatasetError> {
        let json = serde_json::to_string_pretty(self)?;
        write_file(path, json.as_bytes()).await?;
        tracing::info!(path = %path.display(), "quality report saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::FilterStats;
    use tempfile::tempdir;

    fn result(stage: FilterStage, kept: bool, score: u8) -> FilterResult {
        FilterResult {
            index: 0,
            kept,
            score,
            reason: String::new(),
            stage,
            stats: FilterStats::default(),
        }
    }

    #[test]
    fn test_build_counts() {
        let results = vec![
            result(FilterStage::RuleFilter, false, 0),
            result(FilterStage::JudgeEvaluation, true, 8),
            result(FilterStage::JudgeEvaluation, false, 5),
            result(FilterStage::JudgeEvaluation, true, 9),
        ];
        let report = QualityReport::build(
            &results,
            vec![3],
            &ProcessingConfig::default(),
            None,
            Duration::from_secs(2),
        );

        assert_eq!(report.summary.total_entries, 4);
        assert_eq!(report.summary.high_quality_entries, 2);
        assert_eq!(report.summary.low_quality_entries, 2);
        assert_eq!(report.summary.retention_rate_percent, 50.0);
        assert_eq!(report.summary.processing_speed_per_second, 2.0);
        assert_eq!(report.summary.skipped_lines, vec![3]);
        assert_eq!(report.quality_analysis.retention_rate, 0.5);
        assert_eq!(
            report.stage_statistics,
            StageStatistics {
                rule_filter_failed: 1,
                ai_evaluation_failed: 1,
                rule_filter_passed: 3,
                ai_evaluation_passed: 2,
            }
        );
    }

    #[test]
    fn test_empty_report_has_zero_rates() {
        let report = QualityReport::build(
            &[],
            Vec::new(),
            &ProcessingConfig::default(),
            None,
            Duration::ZERO,
        );
        assert_eq!(report.summary.retention_rate_percent, 0.0);
        assert_eq!(report.summary.processing_speed_per_second, 0.0);
    }

    #[tokio::test]
    async fn test_write_report_json_shape() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/filtered_quality_report.json");
        let report = QualityReport::build(
            &[result(FilterStage::JudgeEvaluation, true, 8)],
            Vec::new(),
            &ProcessingConfig::default(),
            Some(ModelInfo {
                provider: "Vertex AI".into(),
                model: "gemini-2.5-flash".into(),
                project_id: Some("hotel-project".into()),
                location: Some("us-central1".into()),
            }),
            Duration::from_millis(500),
        );
        report.write(&path).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(json["summary"]["total_entries"], 1);
        assert_eq!(json["configuration"]["minimum_score"], 7);
        assert_eq!(json["configuration"]["model_info"]["model"], "gemini-2.5-flash");
        assert_eq!(json["stage_statistics"]["ai_evaluation_passed"], 1);
        assert_eq!(json["quality_analysis"]["score_distribution"]["8"], 1);
        assert!(json["generated_at"].is_string());
    }
}
