/// Accumulates raw pipe output and yields complete lines.
///
/// Bytes after the last newline stay buffered until the next chunk arrives.
/// Lines are decoded as UTF-8, replacing invalid sequences.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Drop any incomplete trailing line, returning how many bytes were lost.
    pub fn discard(&mut self) -> usize {
        let lost = self.pending.len();
        self.pending.clear();
        lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_lines() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"percentage\t10\npercentage\t20\n");
        assert_eq!(lines, vec!["percentage\t10", "percentage\t20"]);
        assert_eq!(buf.discard(), 0);
    }

    #[test]
    fn keeps_partial_line_across_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"status\tdown").is_empty());
        assert_eq!(buf.push(b"load\nmess"), vec!["status\tdownload"]);
        assert_eq!(buf.push(b"age\n"), vec!["message"]);
    }

    #[test]
    fn strips_carriage_return_and_keeps_empty_lines() {
        let mut buf = LineBuffer::new();
        assert_eq!(buf.push(b"a\r\n\nb\n"), vec!["a", "", "b"]);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"files\tfoo\t\xff\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("files\tfoo\t"));
        assert!(lines[0].contains('\u{fffd}'));
    }

    #[test]
    fn discard_drops_trailing_bytes() {
        let mut buf = LineBuffer::new();
        buf.push(b"done\nhalf");
        assert_eq!(buf.discard(), 4);
        assert_eq!(buf.discard(), 0);
        assert!(buf.push(b"\n").iter().all(String::is_empty));
    }
}
