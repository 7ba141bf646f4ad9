//! Splits input text into ordered, size-bounded chunks for synthesis.
//!
//! Paragraphs (separated by blank lines) are the primary unit. A paragraph
//! longer than the chunk limit is split at sentence boundaries and the
//! sentences are packed greedily. Text is never dropped: a paragraph without
//! any usable sentence boundary becomes one oversized chunk.

/// One unit of text handed to a single synthesis call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position of this chunk in the original text.
    pub index: usize,
    /// Trimmed, non-empty chunk text.
    pub text: String,
}

impl TextChunk {
    /// Length in bytes, the unit the chunk limit is measured in.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Always false for chunks produced by [`segment`].
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Split `text` into chunks of at most `max_chunk_len` bytes where possible.
///
/// Chunks are returned in input order with consecutive indices starting at 0.
/// A chunk exceeds the limit only when a paragraph or a single sentence has no
/// split point inside it.
pub fn segment(text: &str, max_chunk_len: usize) -> Vec<TextChunk> {
    let mut pieces: Vec<String> = Vec::new();

    for paragraph in split_paragraphs(text) {
        if paragraph.len() <= max_chunk_len {
            pieces.push(paragraph.to_string());
            continue;
        }

        let sentences = split_sentences(paragraph);
        if sentences.len() <= 1 {
            // No sentence punctuation to split on; keep the paragraph whole.
            pieces.push(paragraph.to_string());
            continue;
        }

        pack_sentences(&sentences, max_chunk_len, &mut pieces);
    }

    pieces
        .into_iter()
        .map(|piece| piece.trim().to_string())
        .filter(|piece| !piece.is_empty())
        .enumerate()
        .map(|(index, text)| TextChunk { index, text })
        .collect()
}

/// Greedily pack sentences so that adding the next one never exceeds the limit.
fn pack_sentences(sentences: &[&str], max_chunk_len: usize, out: &mut Vec<String>) {
    let mut current = String::new();

    for sentence in sentences {
        if current.is_empty() {
            current.push_str(sentence);
        } else if current.len() + 1 + sentence.len() > max_chunk_len {
            out.push(std::mem::take(&mut current));
            current.push_str(sentence);
        } else {
            current.push(' ');
            current.push_str(sentence);
        }
    }

    if !current.is_empty() {
        out.push(current);
    }
}

/// Split text into trimmed paragraphs separated by blank (whitespace-only) lines.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    let mut paragraphs = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        if line.trim().is_empty() {
            if let Some(s) = start.take() {
                paragraphs.push(&text[s..end]);
            }
        } else {
            if start.is_none() {
                start = Some(line_start);
            }
            end = offset;
        }
    }

    if let Some(s) = start {
        paragraphs.push(&text[s..end]);
    }

    paragraphs
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Split text into trimmed sentences.
///
/// A boundary is `.`, `!` or `?` immediately followed by whitespace. The
/// punctuation stays with the sentence it ends.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?')
            && let Some(&(_, next)) = chars.peek()
            && next.is_whitespace()
        {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }

    sentences
}
