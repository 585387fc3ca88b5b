//! Batch loop: OCR a window of images, ask the model once for the whole
//! window, and save the rows before moving on.

use tracing::{debug, error, info, warn};

use crate::completion::{build_prompt, combine_transcriptions, request_completion, CompletionService};
use crate::config::PipelineConfig;
use crate::excel::ProgressSink;
use crate::normalize::remap_labels;
use crate::ocr::{extract_text, TextExtractor};
use crate::parser::{align_response, field_columns};
use crate::types::{ImageRef, OutputRow, RunSummary};

/// Images of the current window that produced text, in input order.
#[derive(Debug, Default)]
struct PendingBatch<'a> {
    entries: Vec<(&'a ImageRef, String)>,
}

impl<'a> PendingBatch<'a> {
    fn push(&mut self, image: &'a ImageRef, text: String) {
        self.entries.push((image, text));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn combined_text(&self, tag_records: bool) -> String {
        let texts: Vec<&str> = self.entries.iter().map(|(_, t)| t.as_str()).collect();
        combine_transcriptions(&texts, tag_records)
    }
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    extractor: &'a dyn TextExtractor,
    completion: &'a dyn CompletionService,
    sink: &'a mut dyn ProgressSink,
    next_serial: u32,
    summary: RunSummary,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        extractor: &'a dyn TextExtractor,
        completion: &'a dyn CompletionService,
        sink: &'a mut dyn ProgressSink,
    ) -> Self {
        Self {
            config,
            extractor,
            completion,
            sink,
            next_serial: 1,
            summary: RunSummary::default(),
        }
    }

    /// Process every image and return the run's counters. Never fails: per-image
    /// and per-batch problems are logged and skipped.
    pub fn run(mut self, images: &[ImageRef]) -> RunSummary {
        self.summary.images = images.len();
        let batch_size = self.config.batch_size;
        let mut pending = PendingBatch::default();
        let mut window_start = 0;

        for (idx, image) in images.iter().enumerate() {
            match extract_text(self.extractor, image) {
                Some(text) => pending.push(image, text),
                None => self.summary.ocr_failures += 1,
            }

            let window_full = idx + 1 - window_start >= batch_size;
            let last = idx + 1 == images.len();
            if window_full || last {
                let batch_number = window_start / batch_size + 1;
                self.close_batch(std::mem::take(&mut pending), batch_number, window_start);
                window_start = idx + 1;
            }
        }

        self.save("Final save");
        info!(
            rows = self.summary.rows_written,
            images = self.summary.images,
            ocr_failures = self.summary.ocr_failures,
            batches_failed = self.summary.batches_failed,
            "Run finished"
        );
        self.summary
    }

    fn close_batch(&mut self, batch: PendingBatch<'_>, batch_number: usize, window_start: usize) {
        if batch.is_empty() {
            warn!(batch = batch_number, "No text extracted for any image in batch; skipping");
            self.summary.empty_batches += 1;
            return;
        }

        let tag = self.config.tag_records;
        let text = remap_labels(&batch.combined_text(tag), &self.config.label_map);
        debug!(batch = batch_number, text = %text, "Processed text for completion");
        let prompt = build_prompt(&text, &self.config.fields, tag);
        info!(batch = batch_number, images = batch.len(), "Requesting completion");
        self.summary.batches_sent += 1;

        let Some(response) = request_completion(self.completion, &prompt) else {
            warn!(
                batch = batch_number,
                unrecorded = batch.len(),
                "Batch dropped after completion failure"
            );
            self.summary.batches_failed += 1;
            self.summary.unrecorded_images += batch.len();
            return;
        };

        let (records, report) = align_response(&response, &self.config.fields, batch.len(), tag);
        if !report.is_clean() {
            warn!(
                batch = batch_number,
                missing = ?report.missing,
                duplicates = ?report.duplicates,
                out_of_range = ?report.out_of_range,
                short_fields = ?report.short_fields,
                "Response does not line up with the batch"
            );
            self.summary.alignment_warnings += report.warning_count();
        }
        for (field, values) in field_columns(&records, &self.config.fields) {
            debug!(batch = batch_number, field = %field, values = ?values, "Extracted values");
        }

        let rows: Vec<OutputRow> = batch
            .entries
            .iter()
            .zip(records)
            .map(|((image, _), record)| {
                let serial = self.next_serial;
                self.next_serial += 1;
                OutputRow {
                    serial,
                    image_name: image.name.clone(),
                    record,
                }
            })
            .collect();
        self.summary.rows_written += rows.len();
        self.sink.append_batch(rows);
        self.save("Batch save");

        if self.config.cooldown_due(window_start) {
            info!(
                seconds = self.config.cooldown.as_secs(),
                "Cooling down to stay under the completion service rate limit"
            );
            self.summary.cooldowns += 1;
            std::thread::sleep(self.config.cooldown);
        }
    }

    fn save(&mut self, stage: &str) {
        if let Err(e) = self.sink.persist() {
            error!(stage, rows = self.sink.row_count(), "Error saving progress: {}", e);
            self.summary.persist_failures += 1;
        }
    }
}

/// Convenience wrapper around [`Pipeline`].
pub fn run_pipeline(
    images: &[ImageRef],
    config: &PipelineConfig,
    extractor: &dyn TextExtractor,
    completion: &dyn CompletionService,
    sink: &mut dyn ProgressSink,
) -> RunSummary {
    Pipeline::new(config, extractor, completion, sink).run(images)
}
