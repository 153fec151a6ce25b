//! Entity synonym reconciliation.
//!
//! Mentions of one category whose name embeddings are closer than the
//! threshold are collapsed into the better-ranked mention, summing counts.

use tomo_core::EntityCount;
use tomo_infer::{cosine_similarity, EmbedderBackend};
use tracing::debug;

/// Collapse near-duplicate entities.
///
/// `entities` must be ranked (count descending). The canonical mention is the
/// one ranked first, i.e. the higher count, or the earlier one on ties.
/// Entities the embedder cannot embed are kept as they are.
pub fn reconcile(
    entities: Vec<EntityCount>,
    embedder: &dyn EmbedderBackend,
    threshold: f32,
) -> Vec<EntityCount> {
    if entities.len() < 2 || !embedder.is_available() {
        return entities;
    }

    let names: Vec<&str> = entities.iter().map(|e| e.name.as_str()).collect();
    let embeddings: Vec<_> = embedder
        .embed_batch(&names)
        .into_iter()
        .map(|r| r.map(|r| r.embedding))
        .collect();

    // (canonical entity, its embedding index)
    let mut kept: Vec<(EntityCount, usize)> = Vec::with_capacity(entities.len());
    for (i, entity) in entities.iter().enumerate() {
        let target = embeddings[i].as_ref().and_then(|embedding| {
            kept.iter().position(|(canonical, j)| {
                canonical.category == entity.category
                    && embeddings[*j]
                        .as_ref()
                        .is_some_and(|other| cosine_similarity(embedding, other) > threshold)
            })
        });

        match target {
            Some(k) => {
                debug!(
                    "Merging entity '{}' into '{}' ({})",
                    entity.name, kept[k].0.name, entity.category
                );
                kept[k].0.count += entity.count;
            }
            None => kept.push((entity.clone(), i)),
        }
    }

    let mut merged: Vec<EntityCount> = kept.into_iter().map(|(e, _)| e).collect();
    merged.sort_by(|a, b| b.count.cmp(&a.count));
    merged
}
