use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::FilterResult;

const TOP_KEYWORDS: usize = 10;

/// min / max / mean of a set of lengths
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LengthStats {
    pub min: usize,
    pub max: usize,
    pub avg: f64,
}

impl LengthStats {
    fn from_values(values: &[usize]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        Self {
            min: values.iter().copied().min().unwrap_or(0),
            max: values.iter().copied().max().unwrap_or(0),
            avg: values.iter().sum::<usize>() as f64 / values.len() as f64,
        }
    }
}

/// Aggregate statistics over every filter result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub total_entries: usize,
    pub kept_entries: usize,
    /// Fraction in [0, 1]
    pub retention_rate: f64,
    pub question_length: LengthStats,
    pub answer_length: LengthStats,
    /// Most frequent keywords, count descending, ties in first-seen order
    pub top_keywords: Vec<(String, usize)>,
    pub score_distribution: BTreeMap<u8, usize>,
}

pub fn summarize(results: &[FilterResult]) -> QualitySummary {
    if results.is_empty() {
        return QualitySummary::default();
    }

    let total_entries = results.len();
    let kept_entries = results.iter().filter(|r| r.kept).count();

    let question_lengths: Vec<usize> = results.iter().map(|r| r.stats.question_length).collect();
    let answer_lengths: Vec<usize> = results.iter().map(|r| r.stats.answer_length).collect();

    let mut keyword_counts: Vec<(String, usize)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for keyword in results.iter().flat_map(|r| r.stats.keywords_found.iter()) {
        match positions.get(keyword.as_str()) {
            Some(&pos) => keyword_counts[pos].1 += 1,
            None => {
                positions.insert(keyword.as_str(), keyword_counts.len());
                keyword_counts.push((keyword.clone(), 1));
            }
        }
    }
    // stable sort keeps first-seen order among equal counts
    keyword_counts.sort_by(|a, b| b.1.cmp(&a.1));
    keyword_counts.truncate(TOP_KEYWORDS);

    let mut score_distribution = BTreeMap::new();
    for result in results {
        *score_distribution.entry(result.score).or_insert(0) += 1;
    }

    QualitySummary {
        total_entries,
        kept_entries,
        retention_rate: kept_entries as f64 / total_entries as f64,
        question_length: LengthStats::from_values(&question_lengths),
        answer_length: LengthStats::from_values(&answer_lengths),
        top_keywords: keyword_counts,
        score_distribution,
    }
}
