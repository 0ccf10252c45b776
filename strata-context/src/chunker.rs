//! Adaptive document chunking
//!
//! Structure-preserving splitter. Chunk boundaries prefer, in order: a
//! paragraph break within 100 characters of the target, a sentence break
//! within 150, then the next whitespace word boundary. Overlap between
//! adjacent chunks scales with sentence density when adaptive overlap is on.
//!
//! All offsets are character offsets, so chunks reassemble to the original
//! text exactly once shared overlap regions are deduplicated.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use strata_core::types::{Metadata, MetadataValue};

use crate::types::{Chunk, ChunkerConfig};

/// Hard stop on runaway chunking
const MAX_CHUNKS: usize = 10_000;

static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+").expect("static sentence pattern"));

static PARAGRAPH_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("static paragraph pattern"));

/// Structure-aware splitter with variable overlap
#[derive(Debug, Clone)]
pub struct AdaptiveChunker {
    config: ChunkerConfig,
}

impl AdaptiveChunker {
    /// Create a chunker with default parameters
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ChunkerConfig::default())
    }

    /// Create a chunker with custom parameters
    #[must_use]
    pub const fn with_config(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Split `text` into chunks, attaching `metadata` to each
    #[must_use]
    pub fn chunk_text(&self, text: &str, metadata: &Metadata) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let total_length = chars.len();
        let sentence_positions = boundary_positions(text, &SENTENCE_BOUNDARY, total_length);
        let paragraph_positions = boundary_positions(text, &PARAGRAPH_BOUNDARY, total_length);

        let mut chunks = Vec::new();
        let mut cur_pos = 0usize;
        let mut chunk_index = 0usize;

        while cur_pos < total_length {
            let target_end = cur_pos + self.config.chunk_size;
            let max_pos = (target_end + 200).min(total_length);

            let mut chunk_end = self.find_optimal_boundary(
                &chars,
                target_end.min(total_length),
                &sentence_positions,
                &paragraph_positions,
                max_pos,
            );

            // Clamp to [min_chunk_size, max_chunk_size] relative to cur_pos.
            // A preferred boundary can land behind cur_pos; saturating math
            // folds that case into the minimum-size rescue.
            if chunk_end.saturating_sub(cur_pos) < self.config.min_chunk_size
                && chunk_end < total_length
            {
                chunk_end = (cur_pos + self.config.min_chunk_size).min(total_length);
            }
            if chunk_end.saturating_sub(cur_pos) > self.config.max_chunk_size {
                chunk_end = cur_pos + self.config.max_chunk_size;
            }
            chunk_end = chunk_end.max(cur_pos + 1).min(total_length);

            let overlap = self.overlap_for(cur_pos, chunk_end, &sentence_positions);

            let content: String = chars[cur_pos..chunk_end].iter().collect();
            let mut chunk_metadata = metadata.clone();
            #[allow(clippy::cast_possible_wrap)]
            chunk_metadata.insert(
                "chunk_index".to_string(),
                MetadataValue::Int(chunk_index as i64),
            );
            #[allow(clippy::cast_possible_wrap)]
            chunk_metadata.insert(
                "total_length".to_string(),
                MetadataValue::Int(total_length as i64),
            );

            chunks.push(Chunk {
                chunk_id: format!("chunk_{chunk_index}"),
                content,
                start_pos: cur_pos,
                end_pos: chunk_end,
                overlap_before: if chunk_index > 0 { overlap } else { 0 },
                overlap_after: if chunk_end < total_length { overlap } else { 0 },
                metadata: chunk_metadata,
            });

            // Advance with overlap, always making forward progress
            let next = chunk_end.saturating_sub(overlap);
            cur_pos = if next > cur_pos { next } else { chunk_end };

            chunk_index += 1;
            if chunk_index >= MAX_CHUNKS {
                warn!("chunking stopped at the {MAX_CHUNKS} chunk hard limit");
                break;
            }
        }

        debug!(
            chunks = chunks.len(),
            chars = total_length,
            "chunked document"
        );
        chunks
    }

    /// Greedily merge adjacent chunks while the running size fits
    ///
    /// Two neighbors merge while the combined size stays within `max_size`
    /// and the accumulating chunk is still below the target chunk size.
    /// Outer overlaps are preserved.
    #[must_use]
    pub fn merge_chunks(&self, chunks: Vec<Chunk>, max_size: Option<usize>) -> Vec<Chunk> {
        let max_size = max_size.unwrap_or(self.config.max_chunk_size);
        let mut merged: Vec<Chunk> = Vec::new();
        let mut current: Option<Chunk> = None;

        for chunk in chunks {
            match current.take() {
                None => current = Some(chunk),
                Some(acc) => {
                    let acc_len = acc.content.chars().count();
                    let chunk_len = chunk.content.chars().count();
                    if acc_len + chunk_len <= max_size && acc_len < self.config.chunk_size {
                        let mut metadata = acc.metadata.clone();
                        metadata.insert("merged".to_string(), MetadataValue::Bool(true));
                        current = Some(Chunk {
                            chunk_id: format!("{}_merged", acc.chunk_id),
                            content: format!("{}{}", acc.content, chunk.content),
                            start_pos: acc.start_pos,
                            end_pos: chunk.end_pos,
                            overlap_before: acc.overlap_before,
                            overlap_after: chunk.overlap_after,
                            metadata,
                        });
                    } else {
                        merged.push(acc);
                        current = Some(chunk);
                    }
                }
            }
        }
        if let Some(acc) = current {
            merged.push(acc);
        }
        merged
    }

    fn find_optimal_boundary(
        &self,
        chars: &[char],
        target_pos: usize,
        sentence_positions: &[usize],
        paragraph_positions: &[usize],
        max_pos: usize,
    ) -> usize {
        if let Some(paragraph) = find_nearest(target_pos, paragraph_positions, 100) {
            return paragraph.min(max_pos);
        }

        if self.config.preserve_sentences {
            if let Some(sentence) = find_nearest(target_pos, sentence_positions, 150) {
                return sentence.min(max_pos);
            }
        }

        word_boundary(chars, target_pos, max_pos)
    }

    fn overlap_for(
        &self,
        chunk_start: usize,
        chunk_end: usize,
        sentence_positions: &[usize],
    ) -> usize {
        let overlap = if self.config.adaptive_overlap {
            let sentences = sentence_positions
                .iter()
                .filter(|&&p| p >= chunk_start && p <= chunk_end)
                .count();
            match sentences {
                0..=2 => self.config.base_overlap / 2,
                3..=5 => self.config.base_overlap,
                _ => self.config.base_overlap * 3 / 2,
            }
        } else {
            self.config.base_overlap
        };

        let cap = ((chunk_end - chunk_start) / 3).min(200);
        overlap.min(cap)
    }
}

impl Default for AdaptiveChunker {
    fn default() -> Self {
        Self::new()
    }
}

/// Boundary positions: text start, every pattern match end, text end
///
/// Regex matches are byte-indexed; positions are converted to character
/// offsets so they line up with the chunker's coordinate space.
fn boundary_positions(text: &str, pattern: &Regex, total_chars: usize) -> Vec<usize> {
    let byte_offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    let byte_to_char = |byte: usize| -> usize {
        byte_offsets
            .binary_search(&byte)
            .unwrap_or_else(|insert| insert)
    };

    let mut positions = vec![0];
    for found in pattern.find_iter(text) {
        positions.push(byte_to_char(found.end()));
    }
    positions.push(total_chars);
    positions
}

/// Nearest boundary to `target` within `max_distance`, if any
fn find_nearest(target: usize, positions: &[usize], max_distance: usize) -> Option<usize> {
    let insertion = positions.partition_point(|&p| p < target);
    let mut best: Option<(usize, usize)> = None;
    for candidate in [insertion.checked_sub(1), Some(insertion)]
        .into_iter()
        .flatten()
        .filter_map(|i| positions.get(i).copied())
    {
        let distance = candidate.abs_diff(target);
        if distance <= max_distance && best.is_none_or(|(_, d)| distance < d) {
            best = Some((candidate, distance));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Next whitespace at or after `target`, bounded by `max_pos`
fn word_boundary(chars: &[char], target_pos: usize, max_pos: usize) -> usize {
    let mut pos = target_pos.min(max_pos.saturating_sub(1));
    while pos < max_pos && !chars.get(pos).is_some_and(|c| c.is_whitespace()) {
        pos += 1;
    }
    if pos >= max_pos {
        pos = target_pos;
    }
    pos.min(max_pos)
}
