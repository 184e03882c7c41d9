//! Text chunking with overlap and page tracking
//!
//! The splitter tries separators from coarse to fine (paragraph, line, sentence,
//! word, grapheme) and only descends to a finer one for segments that still exceed
//! the chunk size. Fitting segments are then merged greedily into chunks, carrying
//! up to `overlap` characters of the previous chunk into the next one.
//!
//! Chunks are exact byte spans of the input, so nothing is trimmed or dropped.

use std::collections::VecDeque;
use std::ops::Range;

use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkMetadata, ExtractedDocument};

/// Separators in priority order; the empty string means grapheme boundaries
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Text chunker with configurable size and overlap (both in characters)
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum chunk size in characters
    chunk_size: usize,
    /// Overlap between adjacent chunks
    overlap: usize,
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

impl TextChunker {
    /// Create a new chunker; `overlap` must be smaller than `chunk_size`
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".into()));
        }
        if overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    /// Create from configuration
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into chunk strings
    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.split_spans(text)
            .into_iter()
            .map(|span| &text[span])
            .collect()
    }

    /// Split text into byte spans, in order.
    ///
    /// Consecutive spans either touch or overlap by at most `overlap` characters.
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        self.split_recursive(text, 0, &DEFAULT_SEPARATORS, &mut out);
        out
    }

    /// Chunk an extracted document, tagging each chunk with its source and page.
    ///
    /// Whitespace-only spans carry nothing to retrieve and are skipped.
    pub fn chunk_document(&self, doc: &ExtractedDocument) -> Vec<Chunk> {
        let (text, page_starts) = doc.joined();

        self.split_spans(&text)
            .into_iter()
            .filter(|span| !text[span.clone()].trim().is_empty())
            .map(|span| Chunk {
                text: text[span.clone()].to_string(),
                metadata: ChunkMetadata {
                    source: doc.source.clone(),
                    page: page_at(&page_starts, span.start),
                },
                char_start: span.start,
                char_end: span.end,
            })
            .collect()
    }

    fn split_recursive(
        &self,
        text: &str,
        base: usize,
        separators: &[&str],
        out: &mut Vec<Range<usize>>,
    ) {
        let Some(position) = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
        else {
            if !text.is_empty() {
                out.push(base..base + text.len());
            }
            return;
        };

        let finer = &separators[position + 1..];
        let mut fitting: Vec<Range<usize>> = Vec::new();

        for piece in pieces(text, separators[position]) {
            let piece_text = &text[piece.clone()];

            if char_len(piece_text) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                self.merge(text, base, &fitting, out);
                fitting.clear();
            }

            if finer.is_empty() {
                // Indivisible: a single grapheme longer than the chunk size
                out.push(base + piece.start..base + piece.end);
            } else {
                self.split_recursive(piece_text, base + piece.start, finer, out);
            }
        }

        if !fitting.is_empty() {
            self.merge(text, base, &fitting, out);
        }
    }

    /// Greedily merge contiguous pieces into chunks of at most `chunk_size`
    fn merge(&self, text: &str, base: usize, pieces: &[Range<usize>], out: &mut Vec<Range<usize>>) {
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(&text[piece.clone()]);

            if total + len > self.chunk_size {
                if let (Some((first, _)), Some((last, _))) = (window.front(), window.back()) {
                    out.push(base + first.start..base + last.end);
                }

                // Keep a tail of at most `overlap` chars that still leaves room for the piece
                while total > self.overlap || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            window.push_back((piece.clone(), len));
            total += len;
        }

        if let (Some((first, _)), Some((last, _))) = (window.front(), window.back()) {
            out.push(base + first.start..base + last.end);
        }
    }
}

/// Split keeping each separator at the end of the piece before it
fn pieces(text: &str, separator: &str) -> Vec<Range<usize>> {
    if separator.is_empty() {
        return text
            .grapheme_indices(true)
            .map(|(i, g)| i..i + g.len())
            .collect();
    }

    let mut out = Vec::new();
    let mut start = 0;
    for (i, m) in text.match_indices(separator) {
        let end = i + m.len();
        out.push(start..end);
        start = end;
    }
    if start < text.len() {
        out.push(start..text.len());
    }
    out
}

/// Page containing a byte offset, given ascending page start offsets
fn page_at(page_starts: &[(usize, Option<u32>)], offset: usize) -> Option<u32> {
    page_starts
        .iter()
        .take_while(|(start, _)| *start <= offset)
        .last()
        .and_then(|(_, page)| *page)
}
