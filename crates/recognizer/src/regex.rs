use std::collections::HashMap;

use once_cell::sync::OnceCell;
use regex::{Regex, RegexBuilder};
use store::{AppContext, IntentCategory, IntentRule, RuleKind};

use crate::types::{IntentResult, MatchedRule, RecognizerKind};

/// Regex matcher for structured inputs: part numbers, serial numbers, date
/// formats. Named capture groups become extracted entities.
pub struct RegexMatcher {
    patterns: OnceCell<Vec<CompiledRule>>,
}

struct CompiledRule {
    category: IntentCategory,
    rule: IntentRule,
    pattern: Regex,
}

impl RegexMatcher {
    pub fn new() -> Self {
        Self {
            patterns: OnceCell::new(),
        }
    }

    pub fn recognize(&self, text: &str, ctx: &AppContext) -> Option<IntentResult> {
        let patterns = self.patterns.get_or_init(|| compile_patterns(ctx));
        if patterns.is_empty() || text.is_empty() {
            return None;
        }

        let text_len = text.chars().count().max(1) as f64;
        let mut best: Option<(f64, &CompiledRule, HashMap<String, String>)> = None;

        for compiled in patterns {
            let Some(captures) = compiled.pattern.captures(text) else {
                continue;
            };

            let matched = captures.get(0).map(|m| m.as_str()).unwrap_or_default();
            let coverage = matched.chars().count() as f64 / text_len;
            let confidence = ((0.7 + 0.3 * coverage) * compiled.rule.weight).min(1.0);

            let mut entities = HashMap::new();
            for name in compiled.pattern.capture_names().flatten() {
                if let Some(value) = captures.name(name) {
                    entities.insert(name.to_string(), value.as_str().to_string());
                }
            }

            if best.as_ref().map_or(true, |(current, _, _)| confidence > *current) {
                best = Some((confidence, compiled, entities));
            }
        }

        best.map(|(confidence, compiled, entities)| {
            IntentResult::new(&compiled.category.code, confidence, RecognizerKind::Regex)
                .with_rules(vec![MatchedRule::from(&compiled.rule)])
                .with_entities(entities)
        })
    }
}

impl Default for RegexMatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn compile_patterns(ctx: &AppContext) -> Vec<CompiledRule> {
    let categories: HashMap<i64, &IntentCategory> =
        ctx.categories.iter().map(|c| (c.id, c)).collect();

    let mut compiled = Vec::new();
    for rule in &ctx.rules {
        if rule.kind() != Some(RuleKind::Regex) || !rule.is_active || !rule.enabled {
            continue;
        }
        let Some(category) = categories.get(&rule.category_id).filter(|c| c.is_active) else {
            continue;
        };

        // Invalid patterns are skipped, never fatal.
        match RegexBuilder::new(&rule.content).case_insensitive(true).build() {
            Ok(pattern) => compiled.push(CompiledRule {
                category: (*category).clone(),
                rule: rule.clone(),
                pattern,
            }),
            Err(e) => {
                tracing::warn!(rule_id = rule.id, error = %e, "invalid regex pattern, skipping rule");
            }
        }
    }
    compiled
}
