//! Reassembles blank-line-delimited frames from a chunked byte stream.
//!
//! The transport hands over chunks exactly as they arrive off the wire:
//! a frame may span several chunks, and one chunk may hold zero, one, or
//! many frames. The decoder therefore always splits on the *cumulative*
//! buffer, never per chunk, so a delimiter cut in half by a chunk
//! boundary can neither lose data nor produce a phantom empty frame.

use tracing::warn;

/// Incremental frame reassembler for one response stream.
///
/// Feed every received chunk to [`push`](Self::push) and call
/// [`finish`](Self::finish) once at end of stream. Not restartable;
/// a new stream gets a new decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    frames_emitted: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete frame it unlocked,
    /// in arrival order. The trailing incomplete fragment stays
    /// buffered for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some((start, len)) = find_delimiter(&self.buf) {
            let frame_bytes: Vec<u8> = self.buf.drain(..start + len).take(start).collect();
            // Consecutive delimiters (e.g. keep-alive blank lines) are
            // not frames.
            if frame_bytes.iter().any(|b| !b.is_ascii_whitespace()) {
                frames.push(String::from_utf8_lossy(&frame_bytes).into_owned());
                self.frames_emitted += 1;
            }
        }
        frames
    }

    /// End of stream. A non-empty remainder is an incomplete frame the
    /// server never terminated; it is logged and discarded, never
    /// surfaced as data.
    pub fn finish(&mut self) {
        if self.buf.iter().any(|b| !b.is_ascii_whitespace()) {
            warn!(
                bytes = self.buf.len(),
                "discarding incomplete trailing frame at end of stream"
            );
        }
        self.buf.clear();
    }

    /// Complete frames emitted so far.
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }
}

/// Find the earliest frame delimiter: `\n\n`, or `\r\n\r\n` for servers
/// that emit CRLF line endings. Returns (offset, delimiter length).
fn find_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = find_subsequence(buf, b"\n\n");
    let crlf = find_subsequence(buf, b"\r\n\r\n");
    match (lf, crlf) {
        // The sequences cannot overlap, so plain position order decides.
        (Some(l), Some(c)) if c < l => Some((c, 4)),
        (Some(l), _) => Some((l, 2)),
        (None, Some(c)) => Some((c, 4)),
        (None, None) => None,
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_str(decoder: &mut FrameDecoder, s: &str) -> Vec<String> {
        decoder.push(s.as_bytes())
    }

    #[test]
    fn test_single_frame_in_one_chunk() {
        let mut decoder = FrameDecoder::new();
        let frames = push_str(&mut decoder, "data: {\"type\":\"progress\"}\n\n");
        assert_eq!(frames, vec!["data: {\"type\":\"progress\"}"]);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut decoder = FrameDecoder::new();
        let frames = push_str(&mut decoder, "data: a\n\ndata: b\n\ndata: c\n\n");
        assert_eq!(frames, vec!["data: a", "data: b", "data: c"]);
        assert_eq!(decoder.frames_emitted(), 3);
    }

    #[test]
    fn test_frame_spanning_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(push_str(&mut decoder, "data: {\"type\":").is_empty());
        assert!(push_str(&mut decoder, "\"complete\"}").is_empty());
        let frames = push_str(&mut decoder, "\n\n");
        assert_eq!(frames, vec!["data: {\"type\":\"complete\"}"]);
    }

    #[test]
    fn test_delimiter_split_across_chunk_boundary() {
        let mut decoder = FrameDecoder::new();
        assert!(push_str(&mut decoder, "data: x\n").is_empty());
        let frames = push_str(&mut decoder, "\ndata: y\n\n");
        assert_eq!(frames, vec!["data: x", "data: y"]);
    }

    #[test]
    fn test_byte_by_byte_matches_single_chunk() {
        let input = "data: {\"a\":1}\n\ndata: {\"b\":2}\n\nevent: note\ndata: z\n\n";

        let mut whole = FrameDecoder::new();
        let expected = whole.push(input.as_bytes());

        let mut dribble = FrameDecoder::new();
        let mut collected = Vec::new();
        for byte in input.as_bytes() {
            collected.extend(dribble.push(std::slice::from_ref(byte)));
        }

        assert_eq!(collected, expected);
    }

    #[test]
    fn test_crlf_delimiters() {
        let mut decoder = FrameDecoder::new();
        let frames = push_str(&mut decoder, "data: a\r\n\r\ndata: b\r\n\r\n");
        assert_eq!(frames, vec!["data: a", "data: b"]);
    }

    #[test]
    fn test_mixed_delimiter_styles_split_in_order() {
        let mut decoder = FrameDecoder::new();
        let frames = push_str(&mut decoder, "data: a\r\n\r\ndata: b\n\n");
        assert_eq!(frames, vec!["data: a", "data: b"]);
    }

    #[test]
    fn test_non_utf8_bytes_are_replaced_not_fatal() {
        let mut decoder = FrameDecoder::new();
        let mut chunk = b"data: \xff\xfe{bad}".to_vec();
        chunk.extend_from_slice(b"\n\n");
        let frames = decoder.push(&chunk);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("data: "));
        assert!(frames[0].contains('\u{FFFD}'));
    }

    #[test]
    fn test_consecutive_delimiters_produce_no_empty_frames() {
        let mut decoder = FrameDecoder::new();
        let frames = push_str(&mut decoder, "\n\n\n\ndata: a\n\n\n\n");
        assert_eq!(frames, vec!["data: a"]);
    }

    #[test]
    fn test_finish_discards_incomplete_remainder() {
        let mut decoder = FrameDecoder::new();
        assert!(push_str(&mut decoder, "data: half a fra").is_empty());
        decoder.finish();
        // Remainder is gone; a later (bogus) delimiter finds nothing.
        assert!(push_str(&mut decoder, "\n\n").is_empty());
    }

    #[test]
    fn test_multiline_frame_kept_intact() {
        let mut decoder = FrameDecoder::new();
        let frames = push_str(&mut decoder, "event: progress\ndata: {\"a\":1}\n\n");
        assert_eq!(frames, vec!["event: progress\ndata: {\"a\":1}"]);
    }
}
