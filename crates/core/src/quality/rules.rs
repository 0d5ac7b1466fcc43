//! # Rule Stage
//!
//! Cheap static predicates applied before any model call.
//!
//! An entry passes when it has at most one issue AND mentions at least one
//! hotel keyword. Lengths are counted in characters, not bytes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::dataset::{extract_pair, QaPair};
use crate::error::RecordError;

pub const MIN_QUESTION_LENGTH: usize = 8;
pub const MAX_QUESTION_LENGTH: usize = 120;
pub const MIN_ANSWER_LENGTH: usize = 30;
pub const MAX_ANSWER_LENGTH: usize = 1200;
pub const MIN_ANSWER_CONTENT_LENGTH: usize = 20;

/// Hotel-domain keywords; an entry must mention at least one
pub const HOTEL_KEYWORDS: &[&str] = &[
    "酒店", "宾馆", "客房", "房间", "前台", "服务", "入住", "退房", "预订", "预定", "餐厅", "客人",
    "顾客", "住客", "管家", "清洁", "维修", "设施", "早餐", "会议", "活动", "投诉", "建议", "接待",
    "登记", "结账", "房卡", "钥匙", "毛巾", "床单", "空调", "电视", "浴室", "洗漱", "拖鞋", "礼宾",
    "行李", "叫醒", "续住",
];

const PASSED_REASON: &str = "通过规则检查";
const FORMAT_ERROR_REASON: &str = "数据格式错误：缺少问答内容";

/// Thresholds and vocabulary for the rule stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub min_question_length: usize,
    pub max_question_length: usize,
    pub min_answer_length: usize,
    pub max_answer_length: usize,
    /// Minimum answer length after trimming whitespace
    pub min_answer_content_length: usize,
    pub keywords: Vec<String>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            min_question_length: MIN_QUESTION_LENGTH,
            max_question_length: MAX_QUESTION_LENGTH,
            min_answer_length: MIN_ANSWER_LENGTH,
            max_answer_length: MAX_ANSWER_LENGTH,
            min_answer_content_length: MIN_ANSWER_CONTENT_LENGTH,
            keywords: HOTEL_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Measurements taken while checking an entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    pub question_length: usize,
    pub answer_length: usize,
    pub has_question_mark: bool,
    pub is_hotel_related: bool,
    pub keywords_found: Vec<String>,
}

/// A single rule violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleIssue {
    QuestionLength(usize),
    AnswerLength(usize),
    MissingQuestionMark,
    AnswerTooThin,
    NotHotelRelated,
}

impl fmt::Display for RuleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleIssue::QuestionLength(n) => write!(f, "问题长度异常({}字符)", n),
            RuleIssue::AnswerLength(n) => write!(f, "回答长度异常({}字符)", n),
            RuleIssue::MissingQuestionMark => f.write_str("问题缺少疑问标记"),
            RuleIssue::AnswerTooThin => f.write_str("回答内容过短"),
            RuleIssue::NotHotelRelated => f.write_str("与酒店服务不相关"),
        }
    }
}

/// Outcome of the rule stage for one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleVerdict {
    pub passed: bool,
    pub reason: String,
    pub issues: Vec<RuleIssue>,
    pub stats: FilterStats,
}

impl RuleVerdict {
    fn malformed(reason: String) -> Self {
        Self {
            passed: false,
            reason,
            issues: Vec::new(),
            stats: FilterStats::default(),
        }
    }
}

/// Check a raw JSONL entry
pub fn validate_entry(entry: &Value, config: &RuleConfig) -> RuleVerdict {
    match extract_pair(entry) {
        Ok(pair) => validate_pair(&pair, config),
        Err(RecordError::MissingContents { .. }) | Err(RecordError::UnsupportedShape) => {
            RuleVerdict::malformed(FORMAT_ERROR_REASON.to_string())
        }
        Err(e) => RuleVerdict::malformed(format!("处理错误: {}", e)),
    }
}

/// Check an already-extracted pair
pub fn validate_pair(pair: &QaPair, config: &RuleConfig) -> RuleVerdict {
    let question_length = pair.question.chars().count();
    let answer_length = pair.answer.chars().count();
    let has_question_mark = pair.question.contains('？') || pair.question.contains('?');

    let mut issues = Vec::new();

    if !(config.min_question_length..=config.max_question_length).contains(&question_length) {
        issues.push(RuleIssue::QuestionLength(question_length));
    }
    if !(config.min_answer_length..=config.max_answer_length).contains(&answer_length) {
        issues.push(RuleIssue::AnswerLength(answer_length));
    }
    if !has_question_mark {
        issues.push(RuleIssue::MissingQuestionMark);
    }
    if pair.answer.trim().chars().count() < config.min_answer_content_length {
        issues.push(RuleIssue::AnswerTooThin);
    }

    let combined = format!("{}{}", pair.question, pair.answer);
    let mut keywords_found: Vec<String> = Vec::new();
    for keyword in &config.keywords {
        if combined.contains(keyword.as_str()) && !keywords_found.contains(keyword) {
            keywords_found.push(keyword.clone());
        }
    }
    let is_hotel_related = !keywords_found.is_empty();
    if !is_hotel_related {
        issues.push(RuleIssue::NotHotelRelated);
    }

    let passed = issues.len() <= 1 && is_hotel_related;
    let reason = if issues.is_empty() {
        PASSED_REASON.to_string()
    } else {
        issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    };

    RuleVerdict {
        passed,
        reason,
        issues,
        stats: FilterStats {
            question_length,
            answer_length,
            has_question_mark,
            is_hotel_related,
            keywords_found,
        },
    }
}
