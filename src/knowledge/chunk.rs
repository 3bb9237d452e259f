/// A chunk of extracted text kept for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// Position of the slice in the unfiltered split; part of the vector id.
    pub index: usize,
    pub text: String,
}

/// Split `text` into consecutive slices of `chunk_size` characters, trim each,
/// and keep those with at least `min_chars` characters left.
pub fn split(text: &str, chunk_size: usize, min_chars: usize) -> Vec<TextChunk> {
    if chunk_size == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut count = 0usize;
    let mut index = 0usize;

    let mut push = |slice: &str, index: usize| {
        let trimmed = slice.trim();
        if trimmed.chars().count() >= min_chars {
            chunks.push(TextChunk { index, text: trimmed.to_string() });
        }
    };

    for (pos, ch) in text.char_indices() {
        count += 1;
        if count == chunk_size {
            let end = pos + ch.len_utf8();
            push(&text[start..end], index);
            index += 1;
            start = end;
            count = 0;
        }
    }
    if start < text.len() {
        push(&text[start..], index);
    }
    chunks
}
