//! Reads a combined output stream to completion.

use std::io::{self, BufRead};

/// Separator appended after every captured line.
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

/// Consumes `reader` until end-of-stream.
///
/// Lines may end in `\n`, `\r\n` or a lone `\r`; each one is re-terminated with
/// [`LINE_SEPARATOR`], including the last. Empty input yields an empty string.
/// Invalid UTF-8 is replaced rather than rejected.
pub fn drain<R: BufRead>(mut reader: R) -> io::Result<String> {
    let mut captured = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        for line in trim_terminator(&buf).split(|b| *b == b'\r') {
            captured.push_str(&String::from_utf8_lossy(line));
            captured.push_str(LINE_SEPARATOR);
        }
    }
    Ok(captured)
}

fn trim_terminator(chunk: &[u8]) -> &[u8] {
    let chunk = chunk.strip_suffix(b"\n").unwrap_or(chunk);
    chunk.strip_suffix(b"\r").unwrap_or(chunk)
}
