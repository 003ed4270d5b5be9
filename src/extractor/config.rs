use crate::error::{JevtError, Result};

/// Default output buffer capacity, terminator included.
pub const DEFAULT_OUTPUT_BUFFER_SIZE: usize = 65535;

/// Configuration for an extraction context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// Capacity of the reusable output buffer in bytes, including the
    /// trailing NUL. Every published value must fit.
    pub output_buffer_size: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            output_buffer_size: DEFAULT_OUTPUT_BUFFER_SIZE,
        }
    }
}

impl ExtractorConfig {
    pub fn with_output_buffer_size(mut self, size: usize) -> Self {
        self.output_buffer_size = size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.output_buffer_size == 0 {
            return Err(JevtError::InvalidConfig(
                "output buffer size must be at least 1 byte".to_string(),
            ));
        }
        Ok(())
    }
}
