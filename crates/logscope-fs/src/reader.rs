//! Incremental offset-based content reading.

use std::io::{self, SeekFrom};
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::decode::DecoderPool;

/// Outcome of one incremental read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadResult {
    /// Decoded content from the requested offset to end-of-file
    pub text: String,
    /// End-of-file position at read time; the caller's next offset
    pub offset: u64,
}

/// Read the bytes between `offset` and the current end of file, decode
/// them, and bound the result to the last `tail_lines` lines.
///
/// Offsets beyond end-of-file are clamped; an empty remaining span returns
/// empty text without touching a decoder. A `tail_lines` of zero or less
/// means no bound. Tracking and resetting the offset is the caller's job.
pub async fn read_content(
    path: &Path,
    offset: u64,
    encoding: Option<&str>,
    decoders: &DecoderPool,
    tail_lines: i64,
) -> io::Result<ReadResult> {
    let mut file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let start = offset.min(len);
    if start == len {
        return Ok(ReadResult {
            text: String::new(),
            offset: len,
        });
    }

    file.seek(SeekFrom::Start(start)).await?;
    let span = len - start;
    let mut bytes = Vec::with_capacity(span as usize);
    // the file may keep growing under us; take() pins the read to the
    // length observed above so the offset contract stays exact
    file.take(span).read_to_end(&mut bytes).await?;

    let mut text = decoders.decode(encoding, &bytes);
    if tail_lines > 0 {
        text = tail(&text, tail_lines as usize);
    }

    Ok(ReadResult { text, offset: len })
}

/// Keep only the last `n` lines of `text`, rejoined with `\n`.
pub fn tail(text: &str, n: usize) -> String {
    if n == 0 {
        return text.to_string();
    }
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() <= n {
        return text.to_string();
    }
    lines[lines.len() - n..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    #[tokio::test]
    async fn test_full_read_from_zero() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.log");
        fs::write(&path, "one\ntwo\n").unwrap();

        let pool = DecoderPool::new();
        let result = read_content(&path, 0, None, &pool, 0).await.unwrap();
        assert_eq!(result.text, "one\ntwo\n");
        assert_eq!(result.offset, 8);
    }

    #[tokio::test]
    async fn test_offset_incrementality() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.log");
        fs::write(&path, "first\n").unwrap();

        let pool = DecoderPool::new();
        let first = read_content(&path, 0, None, &pool, 0).await.unwrap();
        assert_eq!(first.text, "first\n");

        // clearing means reading from EOF: nothing until new bytes arrive
        let cleared = read_content(&path, first.offset, None, &pool, 0).await.unwrap();
        assert_eq!(cleared.text, "");
        assert_eq!(cleared.offset, first.offset);

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"second\n").unwrap();

        let appended = read_content(&path, first.offset, None, &pool, 0).await.unwrap();
        assert_eq!(appended.text, "second\n");
    }

    #[tokio::test]
    async fn test_offset_beyond_eof_is_clamped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.log");
        fs::write(&path, "short").unwrap();

        let pool = DecoderPool::new();
        let result = read_content(&path, 9999, None, &pool, 0).await.unwrap();
        assert_eq!(result.text, "");
        assert_eq!(result.offset, 5);
    }

    #[tokio::test]
    async fn test_tail_bound_keeps_last_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.log");
        let content: Vec<String> = (1..=10).map(|i| format!("L{i}")).collect();
        fs::write(&path, content.join("\n")).unwrap();

        let pool = DecoderPool::new();
        let result = read_content(&path, 0, None, &pool, 3).await.unwrap();
        assert_eq!(result.text, "L8\nL9\nL10");
    }

    #[tokio::test]
    async fn test_encoded_read() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.log");
        fs::write(&path, [0x63, 0x61, 0x66, 0xE9]).unwrap();

        let pool = DecoderPool::new();
        let result = read_content(&path, 0, Some("windows-1252"), &pool, 0).await.unwrap();
        assert_eq!(result.text, "café");
    }

    #[test]
    fn test_tail_shorter_than_bound() {
        assert_eq!(tail("a\nb", 5), "a\nb");
        assert_eq!(tail("a\nb\nc", 2), "b\nc");
        assert_eq!(tail("anything", 0), "anything");
    }
}
