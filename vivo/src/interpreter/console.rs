use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

pub const STDOUT: &str = "stdout";
pub const STDERR: &str = "stderr";

/// Named text streams the script and the runtime write into and the host
/// drains. Clones share the same buffers.
#[derive(Clone, Debug, Default)]
pub struct Console {
    inner: Rc<RefCell<ConsoleState>>,
}

#[derive(Debug, Default)]
struct ConsoleState {
    streams: IndexMap<String, String>,
    verbose: bool,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, stream: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut state = self.inner.borrow_mut();
        state
            .streams
            .entry(stream.to_string())
            .or_default()
            .push_str(text);
    }

    /// Returns the buffered text of `stream`, emptying it when `clear` is
    /// set. Unknown streams read as empty.
    pub fn read(&self, stream: &str, clear: bool) -> String {
        let mut state = self.inner.borrow_mut();
        match state.streams.get_mut(stream) {
            Some(buffer) if clear => std::mem::take(buffer),
            Some(buffer) => buffer.clone(),
            None => String::new(),
        }
    }

    /// Writes diagnostic text, but only while verbose output is enabled.
    pub fn log(&self, stream: &str, args: fmt::Arguments<'_>) {
        if !self.verbose() {
            return;
        }
        self.write(stream, &args.to_string());
    }

    pub fn verbose(&self) -> bool {
        self.inner.borrow().verbose
    }

    pub fn set_verbose(&self, verbose: bool) {
        self.inner.borrow_mut().verbose = verbose;
    }

    pub fn streams(&self) -> Vec<String> {
        self.inner.borrow().streams.keys().cloned().collect()
    }
}
