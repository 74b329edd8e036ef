//! Streaming line scanner over a [`Storage`] file.
//!
//! Reads the file in small chunks so the log can grow without the scan
//! needing more than a line's worth of RAM.

use heapless::Vec;

use super::{Storage, StorageError};

/// Longest line kept for parsing; longer lines are reported as overlong.
pub const MAX_LINE_LEN: usize = 128;

const CHUNK_LEN: usize = 64;

/// One line delivered by [`scan_lines`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannedLine<'a> {
    /// A newline-terminated line, without its `\n` or `\r\n`.
    Complete(&'a str),
    /// A newline-terminated line longer than [`MAX_LINE_LEN`].
    Overlong { len: usize },
    /// A newline-terminated line that is not valid UTF-8.
    NotUtf8,
    /// Trailing bytes with no terminating newline, i.e. a row whose write
    /// never finished.
    Torn { len: usize },
}

fn emit<F>(line: &[u8], dropped: usize, on_line: &mut F)
where
    F: FnMut(ScannedLine<'_>),
{
    if dropped > 0 {
        on_line(ScannedLine::Overlong {
            len: line.len() + dropped,
        });
        return;
    }

    let line = line.strip_suffix(b"\r").unwrap_or(line);
    match core::str::from_utf8(line) {
        Ok(text) => on_line(ScannedLine::Complete(text)),
        Err(_) => on_line(ScannedLine::NotUtf8),
    }
}

/// Feed every line of `path` to `on_line`, in file order.
pub fn scan_lines<S, F>(storage: &mut S, path: &str, mut on_line: F) -> Result<(), StorageError>
where
    S: Storage + ?Sized,
    F: FnMut(ScannedLine<'_>),
{
    let mut chunk = [0u8; CHUNK_LEN];
    let mut line: Vec<u8, MAX_LINE_LEN> = Vec::new();
    let mut dropped = 0usize;
    let mut offset = 0u64;

    loop {
        let n = storage.read_at(path, offset, &mut chunk)?;
        if n == 0 {
            break;
        }
        offset += n as u64;

        for &byte in &chunk[..n] {
            if byte == b'\n' {
                emit(&line, dropped, &mut on_line);
                line.clear();
                dropped = 0;
            } else if dropped > 0 || line.push(byte).is_err() {
                dropped += 1;
            }
        }
    }

    if !line.is_empty() || dropped > 0 {
        on_line(ScannedLine::Torn {
            len: line.len() + dropped,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;
    use alloc::string::{String, ToString};
    use alloc::vec::Vec as StdVec;

    fn collect(contents: &[u8]) -> StdVec<String> {
        let mut storage = MemStorage::new();
        storage.insert_file("/data/f", contents);

        let mut out = StdVec::new();
        scan_lines(&mut storage, "/data/f", |line| {
            out.push(match line {
                ScannedLine::Complete(text) => text.to_string(),
                ScannedLine::Overlong { len } => alloc::format!("<overlong {len}>"),
                ScannedLine::NotUtf8 => "<not utf8>".to_string(),
                ScannedLine::Torn { len } => alloc::format!("<torn {len}>"),
            })
        })
        .unwrap();
        out
    }

    #[test]
    fn test_lines_across_chunk_boundaries() {
        let mut contents = StdVec::new();
        for i in 0..20 {
            contents.extend_from_slice(alloc::format!("line number {i}\n").as_bytes());
        }
        let lines = collect(&contents);
        assert_eq!(lines.len(), 20);
        assert_eq!(lines[0], "line number 0");
        assert_eq!(lines[19], "line number 19");
    }

    #[test]
    fn test_crlf_and_torn_tail() {
        let lines = collect(b"a,b\r\nc,d\npartial,1");
        assert_eq!(lines, ["a,b", "c,d", "<torn 9>"]);
    }

    #[test]
    fn test_overlong_line_reported() {
        let mut contents = StdVec::new();
        contents.extend_from_slice(&[b'x'; MAX_LINE_LEN + 10]);
        contents.extend_from_slice(b"\nok\n");
        let lines = collect(&contents);
        assert_eq!(lines, [alloc::format!("<overlong {}>", MAX_LINE_LEN + 10), "ok".to_string()]);
    }

    #[test]
    fn test_invalid_utf8_reported() {
        let lines = collect(b"\xff\xfe\nok\n");
        assert_eq!(lines, ["<not utf8>", "ok"]);
    }

    #[test]
    fn test_missing_file_is_error() {
        let mut storage = MemStorage::new();
        assert_eq!(
            scan_lines(&mut storage, "/data/none", |_| {}),
            Err(StorageError::NotFound)
        );
    }
}
