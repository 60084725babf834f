//! Recursive text chunker
//!
//! Ported from `rag.py`'s `RecursiveCharacterTextSplitter(chunk_size=500,
//! chunk_overlap=50, separators=["\n\n", "\n", "。", ".", " ", ""])`: split on
//! the first separator that actually breaks the text into pieces no longer
//! than `chunk_size`, recursing into any piece that's still too long, then
//! merge adjacent pieces back up to `chunk_size` with `chunk_overlap` of
//! trailing context carried into the next chunk.

const SEPARATORS: &[&str] = &["\n\n", "\n", "。", ".", " ", ""];

pub struct Chunker {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let pieces = self.split_recursive(text, SEPARATORS);
        self.merge(pieces)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        if text.chars().count() <= self.chunk_size {
            return vec![text.to_string()];
        }

        let Some((&sep, rest)) = separators.split_first() else {
            return chunk_by_chars(text, self.chunk_size);
        };

        let parts: Vec<&str> = if sep.is_empty() { vec![text] } else { text.split(sep).collect() };

        if parts.len() <= 1 {
            return self.split_recursive(text, rest);
        }

        let mut out = Vec::new();
        for part in parts {
            if part.is_empty() {
                continue;
            }
            if part.chars().count() > self.chunk_size {
                out.extend(self.split_recursive(part, rest));
            } else {
                out.push(part.to_string());
            }
        }
        out
    }

    /// Greedily pack adjacent pieces up to `chunk_size`, carrying the trailing
    /// `chunk_overlap` characters of each chunk into the start of the next.
    fn merge(&self, pieces: Vec<String>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for piece in pieces {
            if current.is_empty() {
                current = piece;
                continue;
            }

            if current.chars().count() + piece.chars().count() <= self.chunk_size {
                current.push(' ');
                current.push_str(&piece);
            } else {
                chunks.push(std::mem::take(&mut current));
                let overlap = tail_chars(chunks.last().unwrap(), self.chunk_overlap);
                current = format!("{overlap}{piece}");
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }
}

fn tail_chars(s: &str, n: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= n {
        return s.to_string();
    }
    s.chars().skip(char_count - n).collect()
}

fn chunk_by_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        let chunker = Chunker::new(500, 50);
        let chunks = chunker.split("a short sentence.");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn long_text_splits_on_paragraphs() {
        let chunker = Chunker::new(50, 10);
        let text = "first paragraph here with some words.\n\nsecond paragraph with more words to fill space.\n\nthird paragraph also has plenty of words in it.";
        let chunks = chunker.split(text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 70);
        }
    }
}
