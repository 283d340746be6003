//! Framing of an arbitrarily chunked byte stream into newline-terminated lines.
//!
//! Two stages, both carrying state between chunks:
//! - [`Utf8ChunkDecoder`] turns bytes into text without assuming chunk
//!   boundaries fall on character boundaries.
//! - [`LineFramer`] turns text into complete lines, holding back the trailing
//!   partial line until its `\n` arrives or the stream ends.

/// Stream-aware UTF-8 decoder.
///
/// A multi-byte character split across two chunks is held back and emitted
/// whole once its remaining bytes arrive. Invalid sequences decode to
/// `U+FFFD`, like a browser `TextDecoder`.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `chunk`, returning all text that is complete so far.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(error) => {
                    let valid = error.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match error.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(invalid_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid_len);
                        }
                    }
                }
            }
        }
    }

    /// Ends the stream; a dangling partial sequence becomes `U+FFFD`.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

/// Splits text into lines on `\n` only.
///
/// Lines are returned without their terminator. Nothing is dropped: text
/// after the last `\n` stays in the carry buffer until a later push completes
/// it or [`LineFramer::flush`] hands it out at stream end.
#[derive(Debug, Default)]
pub struct LineFramer {
    carry: String,
}

impl LineFramer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every line completed by it, in order.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.carry.push_str(chunk);
        let Some(last_newline) = self.carry.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, rest);
        complete[..last_newline]
            .split('\n')
            .map(ToString::to_string)
            .collect()
    }

    /// Returns the unterminated remainder, if any. Only meant for stream end.
    pub fn flush(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.carry))
        }
    }

    /// Bytes currently held back waiting for a terminator.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.carry.len()
    }
}
