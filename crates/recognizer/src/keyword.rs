use std::collections::HashMap;

use once_cell::sync::OnceCell;
use store::{AppContext, IntentCategory, IntentRule, RuleKind};

use crate::types::{IntentResult, MatchedRule, RecognizerKind};

/// Keyword matcher.
///
/// Rule content is read as comma-separated tokens; a leading `^` marks the
/// remainder as an exact-match entry with O(1) lookup. Partial tokens are
/// scored by match position (equality, prefix, suffix, word boundary,
/// substring) plus a length bonus, then scaled by the rule weight.
pub struct KeywordMatcher {
    index: OnceCell<KeywordIndex>,
}

#[derive(Default)]
struct KeywordIndex {
    exact: HashMap<String, IntentCategory>,
    partial: HashMap<String, Vec<(IntentCategory, IntentRule)>>,
}

impl KeywordMatcher {
    pub fn new() -> Self {
        Self {
            index: OnceCell::new(),
        }
    }

    /// Pure CPU; builds its indices lazily on the first call with this
    /// pipeline's rule set.
    pub fn recognize(&self, text: &str, ctx: &AppContext) -> Option<IntentResult> {
        let index = self.index.get_or_init(|| build_index(ctx));
        if index.exact.is_empty() && index.partial.is_empty() {
            return None;
        }

        let normalized = text.trim().to_lowercase();

        if let Some(category) = index.exact.get(&normalized) {
            // Exact matches answer alone; no rule snapshots are listed.
            return Some(IntentResult::new(&category.code, 1.0, RecognizerKind::Keyword));
        }

        let mut best: Option<(f64, &IntentCategory, &IntentRule)> = None;
        for (token, entries) in &index.partial {
            if !normalized.contains(token.as_str()) {
                continue;
            }
            let base = match_confidence(&normalized, token);
            for (category, rule) in entries {
                let score = (base * rule.weight).min(1.0);
                if best.map_or(true, |(current, _, _)| score > current) {
                    best = Some((score, category, rule));
                }
            }
        }

        best.map(|(score, category, rule)| {
            IntentResult::new(&category.code, score, RecognizerKind::Keyword)
                .with_rules(vec![MatchedRule::from(rule)])
        })
    }
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn build_index(ctx: &AppContext) -> KeywordIndex {
    let categories: HashMap<i64, &IntentCategory> =
        ctx.categories.iter().map(|c| (c.id, c)).collect();

    let mut index = KeywordIndex::default();
    for rule in &ctx.rules {
        if rule.kind() != Some(RuleKind::Keyword) || !rule.is_active {
            continue;
        }
        let Some(category) = categories.get(&rule.category_id).filter(|c| c.is_active) else {
            continue;
        };

        let content = rule.content.trim().to_lowercase();
        if let Some(exact) = content.strip_prefix('^') {
            index
                .exact
                .insert(exact.trim().to_string(), (*category).clone());
        } else {
            for token in content.split(',') {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                index
                    .partial
                    .entry(token.to_string())
                    .or_default()
                    .push(((*category).clone(), rule.clone()));
            }
        }
    }
    index
}

/// Position-based confidence for a token already known to be contained in
/// the input. Lengths are counted in Unicode scalar values.
fn match_confidence(text: &str, token: &str) -> f64 {
    if text == token {
        return 1.0;
    }

    let base = if text.starts_with(token) {
        0.9
    } else if text.ends_with(token) {
        0.85
    } else if format!(" {text} ").contains(&format!(" {token} "))
        || text.contains(&format!(" {token}"))
    {
        0.8
    } else {
        0.6
    };

    let token_len = token.chars().count() as f64;
    let text_len = text.chars().count().max(1) as f64;
    let length_bonus = (token_len / text_len * 0.2).min(0.2);

    (base + length_bonus).min(1.0)
}
