//! Console output buffer and the log forwarder that feeds it.

use crate::model::TaskEvent;
use std::collections::VecDeque;
use std::io;
use tokio::sync::mpsc::UnboundedSender;

const MAX_LINES: usize = 2000;

/// Scroll-back buffer shown in the console pane. Owned by the UI thread.
#[derive(Debug, Clone, Default)]
pub struct Console {
    lines: VecDeque<String>,
}

impl Console {
    /// Append text; embedded newlines become separate lines.
    pub fn push(&mut self, text: &str) {
        for line in text.lines() {
            self.lines.push_back(line.trim_end_matches('\r').to_string());
        }
        if self.lines.len() > MAX_LINES {
            let excess = self.lines.len() - MAX_LINES;
            self.lines.drain(0..excess);
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn lines(&self) -> impl DoubleEndedIterator<Item = &str> + ExactSizeIterator {
        self.lines.iter().map(String::as_str)
    }
}

/// `MakeWriter` that turns each formatted log record into a
/// [`TaskEvent::Console`] so it lands in the console pane instead of the
/// terminal the TUI owns.
#[derive(Clone)]
pub struct ConsoleSink {
    tx: UnboundedSender<TaskEvent>,
}

impl ConsoleSink {
    pub fn new(tx: UnboundedSender<TaskEvent>) -> Self {
        Self { tx }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for ConsoleSink {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter {
            tx: self.tx.clone(),
            buf: Vec::new(),
        }
    }
}

/// Buffers one record and sends it when dropped.
pub struct ConsoleWriter {
    tx: UnboundedSender<TaskEvent>,
    buf: Vec<u8>,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&self.buf);
        let text = text.trim_end();
        if !text.is_empty() {
            // The receiver is gone once the UI has shut down; nothing to do then.
            let _ = self.tx.send(TaskEvent::Console(text.to_string()));
        }
    }
}
