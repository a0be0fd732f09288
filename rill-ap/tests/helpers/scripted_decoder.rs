//! Decoders with scripted behavior
//!
//! A [`ScriptedDecoder`] serves bytes from memory like `MemoryDecoder` but can
//! fail at a chosen stream offset, and it counts rewinds through a shared
//! counter so a test can observe them after the decoder is boxed into a ring.

use rill_ap::audio::{Decoder, PcmFormat, SoundSource};
use rill_ap::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ScriptedDecoder {
    data: Arc<[u8]>,
    cursor: usize,
    max_read: usize,
    /// Fail (once per pass) when the cursor reaches this offset
    fail_at: Option<usize>,
    failed_this_pass: bool,
    resets: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
    format: PcmFormat,
}

impl ScriptedDecoder {
    pub fn new(format: PcmFormat, data: Vec<u8>) -> Self {
        Self {
            data: data.into(),
            cursor: 0,
            max_read: usize::MAX,
            fail_at: None,
            failed_this_pass: false,
            resets: Arc::new(AtomicUsize::new(0)),
            reads: Arc::new(AtomicUsize::new(0)),
            format,
        }
    }

    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = (max_read & !1).max(2);
        self
    }

    /// Report a decode error when the cursor reaches `offset`
    pub fn failing_at(mut self, offset: usize) -> Self {
        self.fail_at = Some(offset);
        self
    }

    /// Shared count of `reset_to_start` calls
    pub fn reset_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.resets)
    }

    /// Shared count of `read` calls
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }
}

impl Decoder for ScriptedDecoder {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let mut end = self.data.len();
        if let Some(fail_at) = self.fail_at {
            if !self.failed_this_pass {
                if self.cursor >= fail_at {
                    self.failed_this_pass = true;
                    return Err(Error::Decode(format!("scripted failure at byte {}", self.cursor)));
                }
                end = end.min(fail_at);
            }
        }

        let count = buf.len().min(end - self.cursor).min(self.max_read);
        buf[..count].copy_from_slice(&self.data[self.cursor..self.cursor + count]);
        self.cursor += count;
        Ok(count)
    }

    fn reset_to_start(&mut self) -> Result<()> {
        self.resets.fetch_add(1, Ordering::Relaxed);
        self.cursor = 0;
        self.failed_this_pass = false;
        Ok(())
    }

    fn format(&self) -> PcmFormat {
        self.format
    }
}

/// Source handing out clones of one scripted decoder (shared counters)
pub struct ScriptedSource {
    template: ScriptedDecoder,
}

impl ScriptedSource {
    pub fn new(template: ScriptedDecoder) -> Self {
        Self { template }
    }
}

impl SoundSource for ScriptedSource {
    fn open(&self) -> Result<Box<dyn Decoder>> {
        Ok(Box::new(self.template.clone()))
    }
}
