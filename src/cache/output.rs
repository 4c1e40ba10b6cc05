//! In-memory output sink for writer-style renderers.
//!
//! Renderers that write into a `fmt::Write` (askama's `render_into`, for one)
//! are captured here instead of writing to the response, and the captured
//! text becomes the page that gets cached.

use std::fmt;

#[derive(Debug, Default)]
pub struct OutputBuffer {
    chunks: Vec<String>,
    len: usize,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_string(self) -> String {
        let mut out = String::with_capacity(self.len);
        for chunk in self.chunks {
            out.push_str(&chunk);
        }
        out
    }
}

impl fmt::Write for OutputBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if !s.is_empty() {
            self.len += s.len();
            self.chunks.push(s.to_string());
        }
        Ok(())
    }
}

/// Run a writer-style renderer against a fresh buffer and return what it wrote.
pub fn capture<F, E>(render: F) -> Result<String, E>
where
    F: FnOnce(&mut OutputBuffer) -> Result<(), E>,
{
    let mut buffer = OutputBuffer::new();
    render(&mut buffer)?;
    Ok(buffer.into_string())
}

#[cfg(test)]
mod tests {
    use std::fmt::Write;

    use super::*;

    #[test]
    fn capture_joins_writes_in_order() {
        let html = capture(|out| -> fmt::Result {
            out.write_str("<h1>")?;
            write!(out, "Unit {}", 3)?;
            out.write_str("</h1>")
        })
        .expect("capture");
        assert_eq!(html, "<h1>Unit 3</h1>");
    }

    #[test]
    fn capture_propagates_failure() {
        let result = capture(|out| {
            out.write_str("partial").map_err(|_| "write")?;
            Err::<(), _>("template failed")
        });
        assert_eq!(result, Err("template failed"));
    }
}
