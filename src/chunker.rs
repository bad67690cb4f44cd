use anyhow::{ensure, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 3000;

/// Splits page text into pieces small enough for one extraction prompt.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_chars: usize,
}

impl Chunker {
    pub fn new(max_chars: usize) -> Result<Self> {
        ensure!(max_chars > 0, "chunk size must be greater than zero");
        Ok(Self { max_chars })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Contiguous slices of `text`, each at most `max_chars` characters.
    /// Concatenating them yields `text` unchanged.
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            rest: text,
            max_chars: self.max_chars,
        }
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    rest: &'a str,
    max_chars: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }

        // Byte offset just past the `max_chars`-th character.
        let Some((window_end, _)) = self.rest.char_indices().nth(self.max_chars) else {
            let last = self.rest;
            self.rest = "";
            return Some(last);
        };

        let window = &self.rest[..window_end];
        let split = window
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(window_end);

        let (chunk, rest) = self.rest.split_at(split);
        self.rest = rest;
        Some(chunk)
    }
}
