use crate::dataset::QaPair;

const MAX_PROMPT_QUESTION_CHARS: usize = 100;
const MAX_PROMPT_ANSWER_CHARS: usize = 300;

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Build the scoring prompt for one batch. Items are numbered from 1.
pub fn build_evaluation_prompt(pairs: &[&QaPair], min_score: u8) -> String {
    let items = pairs
        .iter()
        .enumerate()
        .map(|(i, pair)| {
            format!(
                "[{}] Q: {}\nA: {}",
                i + 1,
                truncate_chars(&pair.question, MAX_PROMPT_QUESTION_CHARS),
                truncate_chars(&pair.answer, MAX_PROMPT_ANSWER_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "请评估以下{count}个酒店服务问答对的质量。\n\
         评分标准：1-10分，{min_score}分及以上为高质量数据。\n\
         \n\
         评估要点：\n\
         1. 问题是否清晰具体且与酒店服务相关？\n\
         2. 回答是否专业准确且有实用价值？\n\
         3. 问答是否匹配且逻辑合理？\n\
         \n\
         {items}\n\
         \n\
         请严格按照JSON数组格式回复，每个问答对一个元素，顺序与编号一致：\n\
         [{{\"score\":8,\"keep\":true}},{{\"score\":6,\"keep\":false}}...]",
        count = pairs.len(),
        min_score = min_score,
        items = items,
    )
}
