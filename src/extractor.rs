pub mod buffer;
pub mod cache;
pub mod config;

use crate::error::Result;
use crate::fields::{FieldId, FieldRequest};
use crate::format::pretty_print;
use crate::path::extract_by_path;
use buffer::{BufferHandle, OutputBuffer};
use cache::DecodeCache;
use config::ExtractorConfig;
use serde_json::Value;
use tracing::{debug, trace};

/// Counters kept by an [`ExtractionContext`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionStats {
    /// Extraction calls received
    pub extractions: u64,
    /// Documents actually parsed by the decode cache
    pub parses: u64,
    /// Calls served from the decode cache
    pub cache_hits: u64,
    /// Calls whose event did not parse
    pub parse_failures: u64,
    /// Calls that produced no value
    pub absent: u64,
    /// Values written to the output buffer
    pub published: u64,
}

/// The part of an event buffer that holds the JSON text.
///
/// Hosts pass NUL-terminated payloads, so anything from the first NUL on is
/// ignored.
pub fn event_payload(raw: &[u8]) -> &[u8] {
    match raw.iter().position(|&b| b == 0) {
        Some(end) => &raw[..end],
        None => raw,
    }
}

/// Extraction state for one plugin instance.
///
/// Not meant to be shared: a host extracting from several threads needs one
/// context per thread, since the cached document and the output buffer are
/// only consistent as a pair.
#[derive(Debug)]
pub struct ExtractionContext {
    config: ExtractorConfig,
    cache: DecodeCache,
    output: OutputBuffer,
    last_error: Option<String>,
    stats: ExtractionStats,
}

impl Default for ExtractionContext {
    fn default() -> Self {
        Self::build(ExtractorConfig::default())
    }
}

impl ExtractionContext {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            output_buffer_size = config.output_buffer_size,
            "created extraction context"
        );
        Ok(Self::build(config))
    }

    fn build(config: ExtractorConfig) -> Self {
        ExtractionContext {
            output: OutputBuffer::new(config.output_buffer_size),
            cache: DecodeCache::new(),
            last_error: None,
            stats: ExtractionStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract field `field_id` of event `event_id` from its raw JSON bytes.
    ///
    /// Returns `None` when the field has no value for this event: the path
    /// does not resolve to a string, the event is not JSON, or the field id
    /// is unknown. Only the last two are recorded as the last error.
    ///
    /// # Panics
    ///
    /// Panics if the value does not fit in the output buffer.
    pub fn extract(
        &mut self,
        event_id: u64,
        field_id: u32,
        arg: Option<&str>,
        raw: &[u8],
    ) -> Option<BufferHandle<'_>> {
        self.stats.extractions += 1;

        let field = match FieldId::try_from(field_id) {
            Ok(field) => field,
            Err(err) => {
                debug!(event_id, field_id, "unknown field requested");
                self.last_error = Some(err.to_string());
                self.stats.absent += 1;
                return None;
            }
        };

        let payload = event_payload(raw);
        let handle = match field {
            FieldId::Value => {
                let parsed = parsed_document(
                    &mut self.cache,
                    &mut self.stats,
                    &mut self.last_error,
                    event_id,
                    payload,
                );
                // A missing argument addresses the same key as an empty one
                match parsed.map(|document| extract_by_path(document, arg.unwrap_or(""))) {
                    Ok(Some(text)) => Some(self.output.publish(text)),
                    Ok(None) | Err(_) => None,
                }
            }
            // Works on the raw bytes every time; the decode cache is not involved
            FieldId::Json => match pretty_print(payload) {
                Some(text) => Some(self.output.publish(&text)),
                None => None,
            },
        };

        match handle {
            Some(handle) => {
                self.stats.published += 1;
                Some(handle)
            }
            None => {
                trace!(event_id, field = field.name(), "field absent");
                self.stats.absent += 1;
                None
            }
        }
    }

    /// Same as [`extract`](Self::extract), taking a parsed `name[arg]` request.
    pub fn extract_request(
        &mut self,
        event_id: u64,
        request: &FieldRequest,
        raw: &[u8],
    ) -> Option<BufferHandle<'_>> {
        self.extract(event_id, request.field.as_u32(), request.arg(), raw)
    }

    /// Parse `raw` for `event_id`, or reuse the document already parsed for it.
    ///
    /// A parse failure is recorded as the last error.
    pub fn ensure_parsed(&mut self, event_id: u64, raw: &[u8]) -> Result<&Value> {
        parsed_document(
            &mut self.cache,
            &mut self.stats,
            &mut self.last_error,
            event_id,
            event_payload(raw),
        )
    }

    /// Diagnostic text of the most recent failure. Kept until a later
    /// failure replaces it.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Event number of the cached document, if any.
    pub fn parsed_event_id(&self) -> Option<u64> {
        self.cache.event_id()
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    pub fn stats(&self) -> ExtractionStats {
        ExtractionStats {
            parses: self.cache.parse_count(),
            cache_hits: self.cache.hit_count(),
            ..self.stats
        }
    }
}

/// Fetch the event's document from the cache, recording a parse failure in
/// the counters and the last error.
fn parsed_document<'c>(
    cache: &'c mut DecodeCache,
    stats: &mut ExtractionStats,
    last_error: &mut Option<String>,
    event_id: u64,
    payload: &[u8],
) -> Result<&'c Value> {
    cache.ensure_parsed(event_id, payload).map_err(|err| {
        debug!(event_id, error = %err, "event is not valid JSON");
        stats.parse_failures += 1;
        *last_error = Some(err.to_string());
        err
    })
}
