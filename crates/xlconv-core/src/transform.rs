use tracing::debug;
use xlconv_parser::{decode_workbook, encode_workbook, Workbook};

use crate::error::TransformError;
use crate::rules::{apply_to_workbook, FieldRule, FIELD_RULES};

/// Fixed progress checkpoints, in percent. They are coarse markers, not a
/// measure of work done.
pub mod checkpoints {
    pub const STARTED: u8 = 10;
    pub const BYTES_READ: u8 = 30;
    pub const DECODED: u8 = 50;
    pub const RULES_APPLIED: u8 = 70;
    pub const ENCODING: u8 = 90;
    pub const DONE: u8 = 100;
}

#[derive(Debug, Clone)]
pub struct TransformEngine {
    rules: Vec<FieldRule>,
}

impl Default for TransformEngine {
    fn default() -> Self {
        Self::new(FIELD_RULES.to_vec())
    }
}

impl TransformEngine {
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn apply(&self, workbook: &mut Workbook) {
        apply_to_workbook(&self.rules, workbook);
    }

    /// Decodes `raw`, remaps every row, and re-encodes as `.xlsx`.
    /// `on_progress` sees each checkpoint once, in increasing order.
    pub fn transform<F>(&self, raw: &[u8], mut on_progress: F) -> Result<Vec<u8>, TransformError>
    where
        F: FnMut(u8),
    {
        on_progress(checkpoints::BYTES_READ);

        let mut workbook = decode_workbook(raw)?;
        on_progress(checkpoints::DECODED);

        self.apply(&mut workbook);
        debug!(
            sheets = workbook.sheets.len(),
            rows = workbook.row_count(),
            "applied field rules"
        );
        on_progress(checkpoints::RULES_APPLIED);

        on_progress(checkpoints::ENCODING);
        let output = encode_workbook(&workbook)?;
        on_progress(checkpoints::DONE);

        Ok(output)
    }
}

/// [`TransformEngine::transform`] with the default field rules.
pub fn transform<F>(raw: &[u8], on_progress: F) -> Result<Vec<u8>, TransformError>
where
    F: FnMut(u8),
{
    TransformEngine::default().transform(raw, on_progress)
}
