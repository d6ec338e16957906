// Loader module
// Turns JSON dataset files into documents ready for embedding

pub mod selector;


use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::ser::Formatter;
use thiserror::Error;
use tracing::{debug, info};

use selector::{Selector, SelectorError};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Selector '{selector}' failed on {}: {source}", path.display())]
    Evaluate {
        path: PathBuf,
        selector: String,
        source: SelectorError,
    },
}

/// Known dataset layouts and the selector that extracts their records
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DatasetPreset {
    /// `waittimes.json`: per-city Emergency and Urgent lists
    #[value(name = "waittimes")]
    WaitTimes,
    /// `operation_hours.json`: every named object under `WaitTimes`
    #[value(name = "operation-hours")]
    OperationHours,
}

impl DatasetPreset {
    #[inline]
    pub fn expression(self) -> &'static str {
        match self {
            Self::WaitTimes => ".[] | .Emergency[], .Urgent[]",
            Self::OperationHours => ".WaitTimes | .. | objects | select(.name != null)",
        }
    }

    #[inline]
    pub fn selector(self) -> Selector {
        Selector::parse(self.expression()).expect("preset selector is valid")
    }
}

/// Where a document came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Path of the source file
    pub source: String,
    /// 1-based position of the match in selector output order, counting skipped matches
    pub seq_num: u32,
}

/// A text document extracted from a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Loads documents from a JSON file using a selector expression
#[derive(Debug, Clone)]
pub struct JsonDocumentLoader {
    path: PathBuf,
    selector: Selector,
}

impl JsonDocumentLoader {
    #[inline]
    pub fn new<P: AsRef<Path>>(path: P, selector: Selector) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            selector,
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Read, parse and select documents from the file
    #[inline]
    pub fn load(&self) -> Result<Vec<Document>, LoaderError> {
        debug!("Loading JSON documents from {}", self.path.display());

        let raw = std::fs::read_to_string(&self.path).map_err(|source| LoaderError::Read {
            path: self.path.clone(),
            source,
        })?;

        let value: Value = serde_json::from_str(&raw).map_err(|source| LoaderError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let documents = self.documents_from_value(&value)?;

        info!(
            "Loaded {} documents from {} with selector '{}'",
            documents.len(),
            self.path.display(),
            self.selector
        );
        Ok(documents)
    }

    /// Select documents from an already parsed value
    #[inline]
    pub fn documents_from_value(&self, value: &Value) -> Result<Vec<Document>, LoaderError> {
        let matches = self
            .selector
            .evaluate(value)
            .map_err(|source| LoaderError::Evaluate {
                path: self.path.clone(),
                selector: self.selector.to_string(),
                source,
            })?;

        let source = self.path.display().to_string();
        let mut documents = Vec::with_capacity(matches.len());

        for (seq_num, matched) in (1..).zip(&matches) {
            let Some(content) = document_text(matched) else {
                debug!("Skipping match {} without text content", seq_num);
                continue;
            };
            documents.push(Document {
                content,
                metadata: DocumentMetadata {
                    source: source.clone(),
                    seq_num,
                },
            });
        }

        Ok(documents)
    }
}

/// Writes `", "` between items and `": "` after keys
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    #[inline]
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    #[inline]
    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    #[inline]
    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn spaced_json(value: &Value) -> String {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    match value.serialize(&mut serializer) {
        Ok(()) => String::from_utf8(buf).unwrap_or_else(|_| value.to_string()),
        Err(_) => value.to_string(),
    }
}

/// Strings are used as-is, anything else as single-line JSON; null and blank text are skipped
fn document_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => spaced_json(other),
    };
    (!text.trim().is_empty()).then_some(text)
}
