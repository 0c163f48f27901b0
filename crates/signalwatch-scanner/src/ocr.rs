//! OCR seam.
//!
//! The scan engine only consumes plain text per document. Engines that cannot
//! produce text fail with [`ScanError::OcrFailure`], which marks the filing
//! `failed` without stopping the scan.

use crate::error::{Result, ScanError};
use async_trait::async_trait;
use signalwatch_registry::Filing;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Turns a fetched filing document into text.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize the document's text.
    async fn recognize(&self, filing: &Filing, document: &[u8]) -> Result<String>;
}

/// Treats the document body as already-extracted UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextOcr;

#[async_trait]
impl OcrEngine for PlainTextOcr {
    async fn recognize(&self, filing: &Filing, document: &[u8]) -> Result<String> {
        String::from_utf8(document.to_vec()).map_err(|e| ScanError::OcrFailure {
            filing_id: filing.id.to_string(),
            reason: format!("document is not text: {e}"),
        })
    }
}

/// Pipes the document through an external program and reads text from stdout.
#[derive(Debug, Clone)]
pub struct CommandOcr {
    program: String,
    args: Vec<String>,
}

impl CommandOcr {
    /// Run `program` with `args` for each document.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl OcrEngine for CommandOcr {
    async fn recognize(&self, filing: &Filing, document: &[u8]) -> Result<String> {
        let failure = |reason: String| ScanError::OcrFailure {
            filing_id: filing.id.to_string(),
            reason,
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failure(format!("failed to start {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(document)
                .await
                .map_err(|e| failure(format!("failed to write document: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| failure(e.to_string()))?;
        if !output.status.success() {
            return Err(failure(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
