//! Line-oriented program output shared with callbacks on the reader thread.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::DEMO_TARGET;

/// Cloneable handle to the program's standard output.
#[derive(Clone)]
pub(crate) struct Output {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Output {
    pub(crate) fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Writes one line and flushes it.
    pub(crate) fn line(&self, args: fmt::Arguments<'_>) -> io::Result<()> {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        sink.write_fmt(args)?;
        sink.write_all(b"\n")?;
        sink.flush()
    }

    /// Writes one line from a callback, where a failure can only be logged.
    pub(crate) fn emit(&self, args: fmt::Arguments<'_>) {
        if let Err(error) = self.line(args) {
            warn!(target: DEMO_TARGET, %error, "failed to write program output");
        }
    }
}

#[cfg(test)]
pub(crate) mod capture {
    //! In-memory writer for asserting on program output.

    use std::io::{self, Write};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Writer whose contents stay readable after it is handed away.
    #[derive(Clone, Default)]
    pub(crate) struct Captured {
        bytes: Arc<Mutex<Vec<u8>>>,
    }

    impl Captured {
        pub(crate) fn text(&self) -> String {
            let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.bytes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
