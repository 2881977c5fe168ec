//! Host-side sinks for guest console output.

/// Console stream a guest wrote to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    /// Map a WASI file descriptor to a console stream.
    pub fn from_fd(fd: i32) -> Option<Self> {
        match fd {
            1 => Some(Stream::Stdout),
            2 => Some(Stream::Stderr),
            _ => None,
        }
    }
}

/// Receives the raw bytes of the guest's `fd_write` calls, in call order.
///
/// A multi-byte character may be split across calls, so sinks decode only
/// once they hold complete text.
pub trait ConsoleSink: Send + 'static {
    fn write(&mut self, stream: Stream, bytes: &[u8]);
}

/// Records every chunk exactly as written.
impl ConsoleSink for Vec<(Stream, Vec<u8>)> {
    fn write(&mut self, stream: Stream, bytes: &[u8]) {
        self.push((stream, bytes.to_vec()));
    }
}

/// Unterminated bytes of one stream, stamped with when they started.
#[derive(Debug, Default)]
struct Partial {
    bytes: Vec<u8>,
    since: u64,
}

/// Line-oriented transcript of both console streams.
///
/// Each stream buffers its own partial line; a line is appended to the shared
/// transcript when its newline arrives, so lines keep the order in which they
/// were completed across stdout and stderr. Lines are decoded as lossy UTF-8
/// only once complete.
#[derive(Debug, Default)]
pub struct Transcript {
    lines: Vec<String>,
    stdout: Partial,
    stderr: Partial,
    writes: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from lines that were produced before the guest ran.
    pub fn with_lines(lines: Vec<String>) -> Self {
        Self {
            lines,
            ..Self::default()
        }
    }

    /// Completed lines so far.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Flush unterminated text, earliest started first, and return all lines.
    pub fn finish(mut self) -> Vec<String> {
        let mut pending = [
            std::mem::take(&mut self.stdout),
            std::mem::take(&mut self.stderr),
        ];
        pending.sort_by_key(|partial| partial.since);
        for partial in pending {
            if !partial.bytes.is_empty() {
                self.lines.push(decode(&partial.bytes));
            }
        }
        self.lines
    }
}

impl ConsoleSink for Transcript {
    fn write(&mut self, stream: Stream, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.writes += 1;
        let partial = match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        };
        if partial.bytes.is_empty() {
            partial.since = self.writes;
        }
        partial.bytes.extend_from_slice(bytes);

        while let Some(newline) = partial.bytes.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = partial.bytes.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.lines.push(decode(&line));
            partial.since = self.writes;
        }
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
