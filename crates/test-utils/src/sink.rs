use std::io;
use std::sync::{Arc, Mutex};

use tandem::orchestrator::OutputSink;

/// Output sink that keeps everything written to it. Clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct SharedSink {
    buf: Arc<Mutex<String>>,
}

impl SharedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.buf.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl OutputSink for SharedSink {
    fn write(&mut self, text: &str) -> io::Result<()> {
        self.buf.lock().unwrap().push_str(text);
        Ok(())
    }
}
