use std::{
    borrow::Cow,
    io::{self, Write as _},
};

use crate::errors::{EgoError, RunResult};

/// Trait for handling output from the `Print`, `Say` and `Newline` opcodes.
///
/// Implement this trait to capture or redirect program output. The default
/// implementation [`StdPrint`] writes to stdout.
pub trait PrintWriter: std::fmt::Debug + Send {
    /// Called once for each formatted value.
    ///
    /// This method writes only the given text; separators and line ends are
    /// emitted through [`push_char`](Self::push_char).
    fn write_str(&mut self, output: Cow<'_, str>) -> RunResult<()>;

    /// Adds a single character, generally a space or newline.
    fn push_char(&mut self, ch: char) -> RunResult<()>;

    /// The text captured so far, for writers that capture.
    fn captured(&self) -> Option<&str> {
        None
    }
}

/// Default `PrintWriter` that writes to stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write_str(&mut self, output: Cow<'_, str>) -> RunResult<()> {
        io::stdout()
            .lock()
            .write_all(output.as_bytes())
            .map_err(|e| EgoError::user(e.to_string()))
    }

    fn push_char(&mut self, ch: char) -> RunResult<()> {
        let mut out = io::stdout().lock();
        let mut buf = [0u8; 4];
        out.write_all(ch.encode_utf8(&mut buf).as_bytes())
            .map_err(|e| EgoError::user(e.to_string()))?;
        if ch == '\n' {
            out.flush().map_err(|e| EgoError::user(e.to_string()))?;
        }
        Ok(())
    }
}

/// A `PrintWriter` that collects all output into a string.
///
/// This is what console capture installs, so a REST handler or a test can read
/// back everything a program printed.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    /// Returns the collected output as a string slice.
    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    /// Consumes the writer and returns the collected output.
    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn write_str(&mut self, output: Cow<'_, str>) -> RunResult<()> {
        self.0.push_str(&output);
        Ok(())
    }

    fn push_char(&mut self, ch: char) -> RunResult<()> {
        self.0.push(ch);
        Ok(())
    }

    fn captured(&self) -> Option<&str> {
        Some(&self.0)
    }
}

/// `PrintWriter` that ignores all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write_str(&mut self, _output: Cow<'_, str>) -> RunResult<()> {
        Ok(())
    }

    fn push_char(&mut self, _ch: char) -> RunResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_collect_string_print() {
        let mut p = CollectStringPrint::new();
        p.write_str(Cow::Borrowed("hello")).unwrap();
        p.push_char(' ').unwrap();
        p.write_str(Cow::Owned("world".to_owned())).unwrap();
        p.push_char('\n').unwrap();
        assert_eq!(p.captured(), Some("hello world\n"));
        assert_eq!(p.into_output(), "hello world\n");
    }

    #[test]
    fn test_no_print_captures_nothing() {
        let mut p = NoPrint;
        p.write_str(Cow::Borrowed("ignored")).unwrap();
        assert_eq!(p.captured(), None);
    }
}
