//! In-memory retrieval index.
//!
//! A [`RetrievalIndex`] is built once from a corpus snapshot (chunk →
//! embed → store) and is immutable afterwards; corpus changes produce a new
//! index rather than mutating this one. Search is brute-force cosine
//! similarity over all stored vectors, which is plenty for a directory of
//! legal documents.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info};

use crate::chunk::{chunk_text, Chunk};
use crate::corpus::LoadedDocument;
use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::error::BackendError;

/// A chunk returned by [`RetrievalIndex::retrieve`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub document: String,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
    pub text: String,
    pub score: f32,
}

struct IndexedChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

pub struct RetrievalIndex {
    entries: Vec<IndexedChunk>,
}

impl RetrievalIndex {
    /// Chunks and embeds `documents`.
    ///
    /// Chunks with identical text (same SHA-256) are indexed once, under the
    /// first document that contains them. Embedding requests are sent in
    /// batches of `batch_size`.
    pub async fn build(
        documents: &[LoadedDocument],
        embedder: &dyn EmbeddingProvider,
        max_tokens: usize,
        batch_size: usize,
    ) -> Result<Self, BackendError> {
        let started = Instant::now();

        let mut seen = HashSet::new();
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| chunk_text(&doc.name, &doc.text, max_tokens))
            .filter(|chunk| seen.insert(chunk.hash.clone()))
            .collect();

        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(BackendError::InvalidResponse {
                    provider: embedder.model_name().to_string(),
                    message: format!(
                        "expected {} embeddings, got {}",
                        batch.len(),
                        vectors.len()
                    ),
                });
            }
            debug!(batch = batch.len(), "embedded chunk batch");
            entries.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, vector)| IndexedChunk { chunk, vector }),
            );
        }

        info!(
            documents = documents.len(),
            chunks = entries.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built retrieval index"
        );

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the documents that contributed at least one chunk.
    pub fn documents(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.chunk.document.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Returns the `top_k` chunks most similar to `query_vec`, best first.
    /// Ties keep corpus order.
    pub fn retrieve(&self, query_vec: &[f32], top_k: usize) -> Vec<RetrievedChunk> {
        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(&e.vector, query_vec), e))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(score, e)| RetrievedChunk {
                document: e.chunk.document.clone(),
                chunk_index: e.chunk.chunk_index,
                text: e.chunk.text.clone(),
                score,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Embeds text as counts of three keywords.
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    ["lease", "patent", "merger"]
                        .iter()
                        .map(|k| t.matches(k).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    fn doc(name: &str, text: &str) -> LoadedDocument {
        LoadedDocument {
            name: name.to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn retrieves_most_similar_first() {
        let docs = vec![
            doc("lease.txt", "The lease term is five years."),
            doc("patent.txt", "The patent covers the widget."),
            doc("merger.txt", "The merger closes in May."),
        ];
        let index = RetrievalIndex::build(&docs, &KeywordEmbedder, 512, 2)
            .await
            .unwrap();
        assert_eq!(index.len(), 3);

        let hits = index.retrieve(&[0.0, 1.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document, "patent.txt");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn duplicate_chunks_are_indexed_once() {
        let boilerplate = "This lease is governed by the laws of the State.";
        let docs = vec![doc("a.txt", boilerplate), doc("b.txt", boilerplate)];
        let index = RetrievalIndex::build(&docs, &KeywordEmbedder, 512, 8)
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.documents(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn retrieved_chunks_carry_their_position() {
        let docs = vec![doc(
            "contract.txt",
            "Recitals and definitions.\n\nThe patent is licensed to the buyer.",
        )];
        let index = RetrievalIndex::build(&docs, &KeywordEmbedder, 10, 8)
            .await
            .unwrap();
        assert_eq!(index.len(), 2);

        let hits = index.retrieve(&[0.0, 1.0, 0.0], 1);
        assert_eq!(hits[0].document, "contract.txt");
        assert_eq!(hits[0].chunk_index, 1);
        assert_eq!(hits[0].text, "The patent is licensed to the buyer.");
    }

    #[tokio::test]
    async fn empty_corpus_builds_empty_index() {
        let index = RetrievalIndex::build(&[], &KeywordEmbedder, 512, 8)
            .await
            .unwrap();
        assert!(index.is_empty());
        assert!(index.retrieve(&[1.0, 0.0, 0.0], 5).is_empty());
    }
}
