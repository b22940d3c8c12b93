//! The timeline progress bar redraws the current console line in place. A log message written
//! while it is active would otherwise leave the tail of the bar behind on screen.

use log::Record;
use log4rs::encode::{Encode, Write};

/// Wraps an encoder and clears the current console line before each record.
#[derive(Debug)]
pub struct PBWrapperEncoder {
    inner: Box<dyn Encode>,
}

impl PBWrapperEncoder {
    pub fn new(inner: Box<dyn Encode>) -> Self {
        Self { inner }
    }
}

impl Encode for PBWrapperEncoder {
    fn encode(&self, w: &mut dyn Write, record: &Record) -> Result<(), anyhow::Error> {
        // Clear the entire line and return the cursor to the beginning.
        w.write_all("\x1B[2K\r".as_bytes())?;
        self.inner.encode(w, record)
    }
}
