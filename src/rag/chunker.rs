//! Document chunking
//!
//! [`SemanticChunker`] groups consecutive sentences until the meaning shifts:
//! each sentence is embedded together with its neighbours, and a chunk ends
//! where the cosine distance to the next window is above a percentile of all
//! distances in the document. Short documents fall back to [`FixedChunker`].

use crate::llm::Embedder;
use crate::types::{AppError, Result};

// ============= Fixed-size chunking =============

/// Character window chunker that never splits a UTF-8 code point.
#[derive(Debug, Clone)]
pub struct FixedChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(AppError::InvalidInput(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.iter().all(|c| c.is_whitespace()) {
            return Vec::new();
        }

        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let chunk: String = chars[start..end].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }
            if end == chars.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

// ============= Sentence handling =============

/// Split text into sentences after `.`, `?` or `!` followed by whitespace, and
/// at every line break. Empty pieces are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = normalized.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            push_sentence(&mut sentences, &mut current);
            continue;
        }

        current.push(c);

        if matches!(c, '.' | '?' | '!') {
            let mut saw_space = false;
            while let Some(&next) = chars.peek() {
                if next == '\n' || !next.is_whitespace() {
                    break;
                }
                saw_space = true;
                chars.next();
            }
            if saw_space {
                push_sentence(&mut sentences, &mut current);
            }
        }
    }
    push_sentence(&mut sentences, &mut current);

    sentences
}

fn push_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

/// Each sentence joined with up to `buffer_size` neighbours on each side.
pub fn combine_with_neighbours(sentences: &[String], buffer_size: usize) -> Vec<String> {
    (0..sentences.len())
        .map(|i| {
            let start = i.saturating_sub(buffer_size);
            let end = (i + buffer_size + 1).min(sentences.len());
            sentences[start..end].join(" ")
        })
        .collect()
}

/// Cosine similarity; 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Quantile of ascending-sorted values with linear interpolation between
/// closest ranks. `p` is in [0, 1].
pub fn quantile(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 || p.is_nan() {
        return None;
    }
    if p <= 0.0 || n < 2 {
        return Some(sorted[0]);
    }
    if p >= 1.0 {
        return Some(sorted[n - 1]);
    }

    let i = (n - 1) as f64 * p;
    let i0 = i.floor() as usize;
    let value0 = sorted[i0];
    let value1 = sorted[i0 + 1];
    Some(value0 + (value1 - value0) * (i - i0 as f64))
}

/// Indices `i` where the distance from window `i` to `i + 1` exceeds the
/// `percentile` threshold.
pub fn breakpoints(distances: &[f64], percentile: f64) -> Vec<usize> {
    let mut sorted = distances.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let Some(threshold) = quantile(&sorted, percentile / 100.0) else {
        return Vec::new();
    };

    distances
        .iter()
        .enumerate()
        .filter(|(_, d)| **d > threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Join sentences into chunks ending at each breakpoint; the tail forms the
/// last chunk.
pub fn group_sentences(sentences: &[String], breakpoints: &[usize]) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut start = 0;

    let last = sentences.len().saturating_sub(1);
    for &bp in breakpoints.iter().chain(std::iter::once(&last)) {
        if bp < start || bp >= sentences.len() {
            continue;
        }
        chunks.push(sentences[start..=bp].join(" "));
        start = bp + 1;
    }

    chunks
}

// ============= Semantic chunking =============

#[derive(Debug, Clone)]
pub struct SemanticChunker {
    buffer_size: usize,
    percentile: f64,
    min_sentences: usize,
    fallback: FixedChunker,
}

impl SemanticChunker {
    pub fn new(
        buffer_size: usize,
        percentile: f64,
        min_sentences: usize,
        fallback: FixedChunker,
    ) -> Self {
        Self {
            buffer_size,
            percentile,
            min_sentences,
            fallback,
        }
    }

    /// Chunk `text`, embedding the sentence windows in a single batch.
    pub async fn chunk(&self, text: &str, embedder: &dyn Embedder) -> Result<Vec<String>> {
        let sentences = split_sentences(text);

        if sentences.len() < self.min_sentences.max(2) {
            return Ok(self.fallback.chunk(text));
        }

        let combined = combine_with_neighbours(&sentences, self.buffer_size);
        let embeddings = embedder.embed_batch(&combined).await?;
        if embeddings.len() != combined.len() {
            return Err(AppError::LLM(format!(
                "Expected {} sentence embeddings, got {}",
                combined.len(),
                embeddings.len()
            )));
        }

        let distances: Vec<f64> = embeddings
            .windows(2)
            .map(|pair| 1.0 - f64::from(cosine_similarity(&pair[0], &pair[1])))
            .collect();

        let cuts = breakpoints(&distances, self.percentile);
        tracing::debug!(
            sentences = sentences.len(),
            chunks = cuts.len() + 1,
            "semantic chunking"
        );

        Ok(group_sentences(&sentences, &cuts))
    }
}
