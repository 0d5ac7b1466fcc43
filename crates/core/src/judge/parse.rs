use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

const MIN_JUDGE_SCORE: u8 = 1;
const MAX_JUDGE_SCORE: u8 = 10;
/// Used when a verdict omits `keep`
const DEFAULT_KEEP_SCORE: u8 = 7;

/// The judge's call on one item of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeVerdict {
    Scored { score: u8, keep: bool },
    /// The response had no usable element at this position
    Missing,
}

impl JudgeVerdict {
    fn from_score(score: u8) -> Self {
        JudgeVerdict::Scored {
            score,
            keep: score >= DEFAULT_KEEP_SCORE,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no verdicts found in judge response")]
    NoVerdicts,
}

fn array_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*?\]").ok()).as_ref()
}

fn score_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)(?:score|评分)"?\s*[:：]\s*"?(\d+(?:\.\d+)?)"#).ok())
        .as_ref()
}

fn clamp_score(raw: f64) -> u8 {
    raw.round()
        .clamp(f64::from(MIN_JUDGE_SCORE), f64::from(MAX_JUDGE_SCORE)) as u8
}

fn score_of(item: &Value) -> Option<u8> {
    let raw = match item.get("score")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    raw.is_finite().then(|| clamp_score(raw))
}

fn verdict_of(item: &Value) -> JudgeVerdict {
    let Some(score) = score_of(item) else {
        return JudgeVerdict::Missing;
    };
    match item.get("keep").and_then(Value::as_bool) {
        Some(keep) => JudgeVerdict::Scored { score, keep },
        None => JudgeVerdict::from_score(score),
    }
}

/// First bracketed span that parses as an array holding at least one scored object
fn parse_array(text: &str) -> Option<Vec<Value>> {
    array_regex()?.find_iter(text).find_map(|m| {
        let items: Vec<Value> = serde_json::from_str(m.as_str()).ok()?;
        items
            .iter()
            .any(|item| score_of(item).is_some())
            .then_some(items)
    })
}

fn parse_loose_scores(text: &str, expected: usize) -> Option<Vec<JudgeVerdict>> {
    let scores: Vec<u8> = score_regex()?
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
        .map(clamp_score)
        .collect();
    (scores.len() == expected).then(|| scores.into_iter().map(JudgeVerdict::from_score).collect())
}

/// Extract exactly `expected` verdicts from a judge response.
///
/// A JSON array is preferred. Positions the array does not cover come back as
/// [`JudgeVerdict::Missing`] and extra elements are dropped. Without an array,
/// loose `score: N` mentions are accepted only if there are exactly `expected`.
pub fn parse_judge_response(text: &str, expected: usize) -> Result<Vec<JudgeVerdict>, ParseError> {
    if let Some(items) = parse_array(text) {
        let mut verdicts: Vec<JudgeVerdict> = items.iter().take(expected).map(verdict_of).collect();
        verdicts.resize(expected, JudgeVerdict::Missing);
        return Ok(verdicts);
    }

    if expected > 0 {
        if let Some(verdicts) = parse_loose_scores(text, expected) {
            tracing::debug!(count = expected, "judge verdicts recovered from loose scores");
            return Ok(verdicts);
        }
    }

    Err(ParseError::NoVerdicts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(score: u8, keep: bool) -> JudgeVerdict {
        JudgeVerdict::Scored { score, keep }
    }

    #[test]
    fn test_patterns_compile() {
        assert!(array_regex().is_some());
        assert!(score_regex().is_some());
    }

    #[test]
    fn test_parse_plain_array() {
        let verdicts =
            parse_judge_response(r#"[{"score":8,"keep":true},{"score":6,"keep":false}]"#, 2)
                .unwrap();
        assert_eq!(verdicts, vec![scored(8, true), scored(6, false)]);
    }

    #[test]
    fn test_parse_array_inside_prose() {
        let text = "好的，评估结果如下：\n```json\n[\n  {\"score\": 9},\n  {\"score\": \"5\"}\n]\n```\n以上。";
        let verdicts = parse_judge_response(text, 2).unwrap();
        assert_eq!(verdicts, vec![scored(9, true), scored(5, false)]);
    }

    #[test]
    fn test_scores_are_rounded_and_clamped() {
        let verdicts =
            parse_judge_response(r#"[{"score":0},{"score":12},{"score":6.6}]"#, 3).unwrap();
        assert_eq!(
            verdicts,
            vec![scored(1, false), scored(10, true), scored(7, true)]
        );
    }

    #[test]
    fn test_short_array_pads_with_missing() {
        let verdicts = parse_judge_response(r#"[{"score":8,"keep":true}]"#, 3).unwrap();
        assert_eq!(
            verdicts,
            vec![scored(8, true), JudgeVerdict::Missing, JudgeVerdict::Missing]
        );
    }

    #[test]
    fn test_long_array_is_truncated() {
        let verdicts =
            parse_judge_response(r#"[{"score":8},{"score":3},{"score":9}]"#, 2).unwrap();
        assert_eq!(verdicts.len(), 2);
    }

    #[test]
    fn test_element_without_score_is_missing() {
        let verdicts =
            parse_judge_response(r#"[{"score":8},{"keep":true},"oops"]"#, 3).unwrap();
        assert_eq!(
            verdicts,
            vec![scored(8, true), JudgeVerdict::Missing, JudgeVerdict::Missing]
        );
    }

    #[test]
    fn test_skips_unrelated_brackets() {
        let text = r#"参考 [1] 和 [2]，结果：[{"score":7,"keep":true}]"#;
        assert_eq!(parse_judge_response(text, 1).unwrap(), vec![scored(7, true)]);
    }

    #[test]
    fn test_loose_score_fallback() {
        let text = "第一条 score: 8，第二条 \"score\": 4，第三条 评分：9";
        let verdicts = parse_judge_response(text, 3).unwrap();
        assert_eq!(
            verdicts,
            vec![scored(8, true), scored(4, false), scored(9, true)]
        );
    }

    #[test]
    fn test_loose_score_count_mismatch() {
        assert_eq!(
            parse_judge_response("score: 8", 2),
            Err(ParseError::NoVerdicts)
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert_eq!(
            parse_judge_response("I cannot help with that.", 1),
            Err(ParseError::NoVerdicts)
        );
        assert_eq!(parse_judge_response("", 0), Err(ParseError::NoVerdicts));
    }
}
