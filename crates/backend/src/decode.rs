/// Incremental UTF-8 decoder for the streamed response body.
///
/// Chunk boundaries can split a multi-byte scalar, so the incomplete tail is
/// held back until the next chunk instead of surfacing as garbage. Bytes that
/// can never complete a scalar decode to U+FFFD and decoding resumes after
/// them, one bad byte cannot poison the rest of the stream.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes everything decodable from the held tail plus `bytes`.
    pub fn feed(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut decoded = String::new();
        let mut consumed = 0;
        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(tail) => {
                    decoded.push_str(tail);
                    consumed = self.pending.len();
                    break;
                }
                Err(error) => {
                    let valid_up_to = error.valid_up_to();
                    if valid_up_to > 0 {
                        if let Ok(valid) =
                            std::str::from_utf8(&self.pending[consumed..consumed + valid_up_to])
                        {
                            decoded.push_str(valid);
                        }
                        consumed += valid_up_to;
                    }
                    match error.error_len() {
                        Some(invalid_len) => {
                            decoded.push(char::REPLACEMENT_CHARACTER);
                            consumed += invalid_len;
                        }
                        // A valid prefix of a multi-byte scalar; wait for
                        // the rest of it.
                        None => break,
                    }
                }
            }
        }

        self.pending.drain(..consumed);
        decoded
    }

    /// Flushes the held tail at end of stream. A scalar left incomplete at
    /// that point decodes to U+FFFD.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}
