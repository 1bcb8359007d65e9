//! CLI-based OCR backend: `pdftotext`/`pdfinfo` for PDFs, `tesseract` for
//! images.

use std::io::Write;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, warn};

use consulta_core::defaults::{DEFAULT_OCR_LANGUAGE, ENV_OCR_LANGUAGE, OCR_TIMEOUT_SECS};
use consulta_core::{Error, ImageExtraction, OcrBackend, PdfExtraction, Result};

/// OCR backend shelling out to poppler and tesseract.
pub struct CliOcrBackend {
    default_language: String,
    timeout_secs: u64,
}

impl CliOcrBackend {
    pub fn new(default_language: String) -> Self {
        Self {
            default_language,
            timeout_secs: OCR_TIMEOUT_SECS,
        }
    }

    pub fn from_env() -> Self {
        let language =
            std::env::var(ENV_OCR_LANGUAGE).unwrap_or_else(|_| DEFAULT_OCR_LANGUAGE.to_string());
        Self::new(language)
    }

    /// Run a command with a timeout, returning stdout.
    async fn run_cmd(&self, cmd: &mut Command) -> Result<Vec<u8>> {
        let output = tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_secs),
            cmd.output(),
        )
        .await
        .map_err(|_| Error::Timeout(format!("OCR command exceeded {}s", self.timeout_secs)))?
        .map_err(|e| Error::ProviderUnavailable(format!("Failed to execute command: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ProviderUnavailable(format!(
                "Command failed (exit {}): {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    fn write_temp(data: &[u8]) -> Result<NamedTempFile> {
        let mut tmpfile = NamedTempFile::new()
            .map_err(|e| Error::Internal(format!("Failed to create temp file: {}", e)))?;
        tmpfile
            .write_all(data)
            .map_err(|e| Error::Internal(format!("Failed to write temp file: {}", e)))?;
        Ok(tmpfile)
    }

    /// Total page count from `pdfinfo` output.
    fn parse_page_count(pdfinfo_output: &str) -> Option<usize> {
        pdfinfo_output
            .lines()
            .find(|line| line.starts_with("Pages:"))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|n| n.parse().ok())
    }

    /// Mean word confidence from tesseract TSV output (column 11 is the
    /// confidence, -1 for non-word rows).
    fn parse_tsv_confidence(tsv: &str) -> f64 {
        let confidences: Vec<f64> = tsv
            .lines()
            .skip(1)
            .filter_map(|line| {
                let cols: Vec<&str> = line.split('\t').collect();
                cols.get(10).and_then(|c| c.parse::<f64>().ok())
            })
            .filter(|c| *c >= 0.0)
            .collect();
        if confidences.is_empty() {
            return 0.0;
        }
        (confidences.iter().sum::<f64>() / confidences.len() as f64) / 100.0
    }
}

impl Default for CliOcrBackend {
    fn default() -> Self {
        Self::new(DEFAULT_OCR_LANGUAGE.to_string())
    }
}

#[async_trait]
impl OcrBackend for CliOcrBackend {
    async fn extract_pdf(&self, data: &[u8], max_pages: usize) -> Result<PdfExtraction> {
        if data.len() < 4 || &data[0..4] != b"%PDF" {
            return Err(Error::InvalidMedia(
                "missing %PDF header".to_string(),
            ));
        }

        let tmpfile = Self::write_temp(data)?;
        let pdf_path = tmpfile.path().to_string_lossy().to_string();

        let info = self.run_cmd(Command::new("pdfinfo").arg(&pdf_path)).await?;
        let page_count = Self::parse_page_count(&String::from_utf8_lossy(&info)).unwrap_or(1);
        let read_pages = page_count.min(max_pages);

        debug!(page_count, read_pages, "Extracting PDF text layer");

        let stdout = self
            .run_cmd(
                Command::new("pdftotext")
                    .arg("-f")
                    .arg("1")
                    .arg("-l")
                    .arg(read_pages.to_string())
                    .arg(&pdf_path)
                    .arg("-"),
            )
            .await?;

        Ok(PdfExtraction {
            text: String::from_utf8_lossy(&stdout).trim().to_string(),
            page_count,
        })
    }

    async fn extract_image(&self, data: &[u8], lang: &str) -> Result<ImageExtraction> {
        if data.is_empty() {
            return Err(Error::InvalidMedia("empty image".to_string()));
        }

        let lang = if lang.is_empty() {
            &self.default_language
        } else {
            lang
        };

        let tmpfile = Self::write_temp(data)?;
        let img_path = tmpfile.path().to_string_lossy().to_string();

        // TSV output carries per-word confidences alongside the text.
        let tsv_out = self
            .run_cmd(
                Command::new("tesseract")
                    .arg(&img_path)
                    .arg("stdout")
                    .arg("-l")
                    .arg(lang)
                    .arg("tsv"),
            )
            .await?;
        let tsv = String::from_utf8_lossy(&tsv_out).into_owned();
        let confidence = Self::parse_tsv_confidence(&tsv);

        let text_out = self
            .run_cmd(
                Command::new("tesseract")
                    .arg(&img_path)
                    .arg("stdout")
                    .arg("-l")
                    .arg(lang),
            )
            .await?;
        let text = String::from_utf8_lossy(&text_out).trim().to_string();

        if text.is_empty() {
            warn!(lang, "OCR produced no text");
        }

        Ok(ImageExtraction { text, confidence })
    }

    async fn health_check(&self) -> Result<bool> {
        let pdftotext_ok = match Command::new("pdftotext").arg("-v").output().await {
            Ok(output) => output.status.success() || output.status.code() == Some(99),
            Err(_) => false,
        };
        let tesseract_ok = match Command::new("tesseract").arg("--version").output().await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        };
        Ok(pdftotext_ok && tesseract_ok)
    }
}
