/// Incremental UTF-8 decoder for a chunked response body.
///
/// Multi-byte characters split across chunk boundaries are held back until
/// the rest arrives. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut text = String::with_capacity(self.pending.len());
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match e.error_len() {
                        Some(invalid_len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + invalid_len);
                        }
                        // incomplete trailing sequence
                        None => {
                            self.pending.drain(..valid_up_to);
                            break;
                        }
                    }
                }
            }
        }
        text
    }

    /// Flushes whatever is still held back once the body has ended.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_joins_characters_split_across_chunks() {
        let bytes = "héllo ✓".as_bytes();
        let mut decoder = Utf8Decoder::new();

        let mut out = String::new();
        for byte in bytes {
            out.push_str(&decoder.decode(std::slice::from_ref(byte)));
        }
        out.push_str(&decoder.finish());

        assert_eq!(out, "héllo ✓");
    }

    #[test]
    fn decoder_holds_back_incomplete_tail() {
        let check = "✓".as_bytes();
        let mut decoder = Utf8Decoder::new();

        assert_eq!(decoder.decode(&[b'a', check[0], check[1]]), "a");
        assert_eq!(decoder.decode(&check[2..]), "✓");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"ok\xffok"), "ok\u{fffd}ok");
    }

    #[test]
    fn decoder_flushes_truncated_sequence_on_finish() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&"✓".as_bytes()[..2]), "");
        assert_eq!(decoder.finish(), "\u{fffd}");
    }
}
