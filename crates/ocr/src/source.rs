use serde::Deserialize;
use thiserror::Error;

use crate::blocks::OcrBlock;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Block JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid block data: {0}")]
    Invalid(String),
}

/// Abstraction over whatever produced the OCR fragments.
/// Recognition itself happens elsewhere; a source only hands over positioned blocks.
pub trait BlockSource: Send + Sync {
    fn blocks(&self) -> Result<Vec<OcrBlock>, SourceError>;
}

// ── In-memory source (tests and callers that already hold blocks) ─────────────

pub struct StaticSource {
    pub blocks: Vec<OcrBlock>,
}

impl StaticSource {
    pub fn new(blocks: Vec<OcrBlock>) -> Self {
        Self { blocks }
    }
}

impl BlockSource for StaticSource {
    fn blocks(&self) -> Result<Vec<OcrBlock>, SourceError> {
        Ok(self.blocks.clone())
    }
}

// ── JSON source ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum BlockDocument {
    Bare(Vec<OcrBlock>),
    Wrapped { blocks: Vec<OcrBlock> },
}

/// A JSON array of blocks, or an object with a `blocks` array.
pub struct JsonSource {
    pub json: String,
}

impl JsonSource {
    pub fn new(json: impl Into<String>) -> Self {
        Self { json: json.into() }
    }
}

impl BlockSource for JsonSource {
    fn blocks(&self) -> Result<Vec<OcrBlock>, SourceError> {
        let value: serde_json::Value = serde_json::from_str(&self.json)?;
        if !value.is_array() && value.get("blocks").is_none() {
            return Err(SourceError::Invalid("expected an array or an object with `blocks`".into()));
        }
        let blocks = match serde_json::from_value(value)? {
            BlockDocument::Bare(blocks) | BlockDocument::Wrapped { blocks } => blocks,
        };
        if let Some(bad) = blocks.iter().find(|b| b.page == Some(0)) {
            return Err(SourceError::Invalid(format!("page numbers start at 1 ('{}')", bad.text)));
        }
        tracing::debug!(blocks = blocks.len(), "loaded blocks from JSON");
        Ok(blocks)
    }
}
