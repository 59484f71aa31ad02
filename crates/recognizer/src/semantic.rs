use std::collections::HashMap;
use std::sync::Arc;

use embedding::{cosine_similarity, Encoder};
use store::{AppContext, IntentRule, RuleKind};
use tokio::sync::OnceCell;

use crate::error::RecognizerError;
use crate::types::{IntentResult, MatchedRule, RecognizerKind};

/// Default similarity floor below which a semantic best match is rejected.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.55;

/// Semantic similarity matcher.
///
/// Rule examples are batch-encoded once per pipeline instance and grouped by
/// category; an incoming utterance is encoded once and compared against
/// every example by cosine similarity scaled by the rule weight. The best
/// category wins if it clears the similarity threshold.
pub struct SemanticMatcher {
    encoder: Arc<Encoder>,
    threshold: f64,
    index: OnceCell<SemanticIndex>,
}

struct RuleEmbedding {
    vector: Vec<f32>,
    weight: f64,
    rule: IntentRule,
}

#[derive(Default)]
struct SemanticIndex {
    by_category: HashMap<i64, Vec<RuleEmbedding>>,
}

impl SemanticMatcher {
    pub fn new(encoder: Arc<Encoder>, threshold: f64) -> Self {
        Self {
            encoder,
            threshold,
            index: OnceCell::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub async fn recognize(
        &self,
        text: &str,
        ctx: &AppContext,
    ) -> Result<Option<IntentResult>, RecognizerError> {
        let index = self
            .index
            .get_or_try_init(|| self.build_index(ctx))
            .await?;
        if index.by_category.is_empty() {
            return Ok(None);
        }

        let input = self.encoder.encode(text).await?;

        let mut best: Option<(f64, i64, &IntentRule)> = None;
        for (category_id, examples) in &index.by_category {
            for example in examples {
                let score = cosine_similarity(&input, &example.vector) as f64 * example.weight;
                if best.map_or(true, |(current, _, _)| score > current) {
                    best = Some((score, *category_id, &example.rule));
                }
            }
        }

        let Some((score, category_id, rule)) = best else {
            return Ok(None);
        };
        if score < self.threshold {
            tracing::debug!(
                best = score,
                threshold = self.threshold,
                "semantic best match below threshold"
            );
            return Ok(None);
        }

        let Some(category) = ctx
            .categories
            .iter()
            .find(|c| c.id == category_id && c.is_active)
        else {
            return Ok(None);
        };

        Ok(Some(
            IntentResult::new(&category.code, score, RecognizerKind::Semantic)
                .with_rules(vec![MatchedRule::from(rule)]),
        ))
    }

    /// Batch-encode every semantic rule of the context in one encoder call.
    async fn build_index(&self, ctx: &AppContext) -> Result<SemanticIndex, RecognizerError> {
        let active_categories: HashMap<i64, ()> = ctx
            .categories
            .iter()
            .filter(|c| c.is_active)
            .map(|c| (c.id, ()))
            .collect();

        let semantic_rules: Vec<&IntentRule> = ctx
            .rules
            .iter()
            .filter(|r| {
                r.kind() == Some(RuleKind::Semantic)
                    && r.is_active
                    && active_categories.contains_key(&r.category_id)
            })
            .collect();

        if semantic_rules.is_empty() {
            return Ok(SemanticIndex::default());
        }

        tracing::info!(count = semantic_rules.len(), "batch encoding semantic rules");
        let texts: Vec<&str> = semantic_rules.iter().map(|r| r.content.as_str()).collect();
        let vectors = self.encoder.encode_batch(&texts).await?;

        let mut index = SemanticIndex::default();
        for (rule, vector) in semantic_rules.into_iter().zip(vectors) {
            index
                .by_category
                .entry(rule.category_id)
                .or_default()
                .push(RuleEmbedding {
                    vector,
                    weight: rule.weight,
                    rule: rule.clone(),
                });
        }
        Ok(index)
    }
}
