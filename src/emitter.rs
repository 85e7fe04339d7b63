//! Buffered output emission for long-running decode batches
//!
//! Text blocks and attention records accumulate in memory and hit disk
//! every `flush_every` examples and once more at shutdown. Every flush
//! reopens its destination in append mode and closes it again, so a
//! crash mid-run loses at most the unflushed buffer, never prior
//! output. With no text destination configured, blocks are printed to
//! stdout as they arrive instead of being buffered.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::config::DecodeConfig;
use crate::decode::{AttentionRecord, ExampleOutput};
use crate::error::{ApuntarError, Result};
use crate::stats::DecodeStats;

/// Accumulates decode output and flushes it in batches
#[derive(Debug)]
pub struct BufferedEmitter {
    save_pred_path: Option<PathBuf>,
    attn_path: Option<PathBuf>,
    flush_every: usize,
    text_buf: Vec<String>,
    attn_buf: Vec<AttentionRecord>,
    emitted_since_flush: usize,
    finished: bool,
    stats: DecodeStats,
}

impl BufferedEmitter {
    /// Create an emitter from a validated configuration
    ///
    /// Creates the attention-dump directory when dumping is enabled.
    ///
    /// # Errors
    ///
    /// Returns `Err` on an invalid configuration or an uncreatable
    /// attention directory.
    pub fn new(config: &DecodeConfig, stats: DecodeStats) -> Result<Self> {
        config.validate()?;

        let attn_path = config.attn_path();
        if let Some(path) = &attn_path {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).map_err(|e| ApuntarError::IoError {
                    message: format!("Failed to create attention dir {}: {e}", dir.display()),
                })?;
            }
        }

        Ok(Self {
            save_pred_path: config.save_pred_path.clone(),
            attn_path,
            flush_every: config.flush_every,
            text_buf: Vec::new(),
            attn_buf: Vec::new(),
            emitted_since_flush: 0,
            finished: false,
            stats,
        })
    }

    /// Accept one example's output, flushing when the threshold is hit
    ///
    /// # Errors
    ///
    /// Returns `Err` when a triggered flush fails; the buffered data is
    /// kept for the shutdown retry.
    pub fn emit(&mut self, output: ExampleOutput) -> Result<()> {
        if self.save_pred_path.is_some() {
            self.text_buf.push(output.text_block);
        } else {
            print!("{}", output.text_block);
        }
        self.attn_buf.extend(output.attn_records);

        self.stats.record_example();
        self.emitted_since_flush += 1;
        if self.emitted_since_flush >= self.flush_every {
            self.flush()?;
        }
        Ok(())
    }

    /// Append both buffers to their destinations
    ///
    /// A no-op when nothing is buffered. Each destination is opened in
    /// append mode and closed before this returns, success or not; a
    /// buffer is cleared only after its write succeeded, so failed data
    /// survives for the shutdown retry.
    ///
    /// # Errors
    ///
    /// Returns the first write failure after both destinations have
    /// been attempted and released.
    pub fn flush(&mut self) -> Result<()> {
        self.emitted_since_flush = 0;
        if self.text_buf.is_empty() && self.attn_buf.is_empty() {
            return Ok(());
        }

        let text_result = self.flush_text();
        let attn_result = self.flush_attn();

        text_result?;
        attn_result?;
        self.stats.record_flush();
        Ok(())
    }

    fn flush_text(&mut self) -> Result<()> {
        let Some(path) = &self.save_pred_path else {
            return Ok(());
        };
        if self.text_buf.is_empty() {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ApuntarError::IoError {
                message: format!("Failed to open {}: {e}", path.display()),
            })?;
        for block in &self.text_buf {
            file.write_all(block.as_bytes())
                .map_err(|e| ApuntarError::IoError {
                    message: format!("Failed to write {}: {e}", path.display()),
                })?;
        }
        // File handle drops (closes) here; clear only after success.
        self.text_buf.clear();
        Ok(())
    }

    fn flush_attn(&mut self) -> Result<()> {
        let Some(path) = &self.attn_path else {
            return Ok(());
        };
        if self.attn_buf.is_empty() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ApuntarError::IoError {
                message: format!("Failed to open {}: {e}", path.display()),
            })?;
        bincode::serialize_into(file, &self.attn_buf).map_err(|e| {
            ApuntarError::IoError {
                message: format!("Failed to serialize attention records: {e}"),
            }
        })?;
        self.attn_buf.clear();
        Ok(())
    }

    /// Final flush, exactly once
    ///
    /// Repeated calls are no-ops. On failure the buffers are dropped
    /// after the single retry; handles are already released.
    ///
    /// # Errors
    ///
    /// Returns the flush failure, if any.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let result = self.flush();
        self.text_buf.clear();
        self.attn_buf.clear();
        result
    }

    /// Number of examples currently waiting in the buffer
    #[must_use]
    pub fn pending(&self) -> usize {
        self.text_buf.len()
    }
}

impl Drop for BufferedEmitter {
    fn drop(&mut self) {
        // Shutdown flush if the caller forgot; errors can't propagate
        // from drop, callers wanting them must use finish().
        let _ = self.finish();
    }
}
