use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use card_scanner_lib::completion::CompletionService;
use card_scanner_lib::config::PipelineConfig;
use card_scanner_lib::error::{CompletionError, OcrError, SinkError};
use card_scanner_lib::excel::{read_rows, ProgressSink, XlsxSink};
use card_scanner_lib::ocr::TextExtractor;
use card_scanner_lib::pipeline::run_pipeline;
use card_scanner_lib::types::{Field, ImageRef, OutputRow};

struct FakeOcr {
    failing: HashSet<String>,
    extra: Option<String>,
    calls: Cell<usize>,
}

impl FakeOcr {
    fn new() -> Self {
        Self {
            failing: HashSet::new(),
            extra: None,
            calls: Cell::new(0),
        }
    }

    fn failing(names: impl IntoIterator<Item = String>) -> Self {
        Self {
            failing: names.into_iter().collect(),
            ..Self::new()
        }
    }
}

impl TextExtractor for FakeOcr {
    fn name(&self) -> &str {
        "fake-ocr"
    }

    fn run_ocr(&self, path: &Path) -> Result<String, OcrError> {
        self.calls.set(self.calls.get() + 1);
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        if self.failing.contains(&name) {
            return Err(OcrError::Network);
        }
        let mut text = format!("Card {}", name);
        if let Some(extra) = &self.extra {
            text.push('\n');
            text.push_str(extra);
        }
        Ok(text)
    }
}

/// Answers each prompt with one well-formed block per `Card <name>` line.
struct FakeCompletion {
    prompts: RefCell<Vec<String>>,
    fail_calls: HashSet<usize>,
    omit: Option<Field>,
    reverse_tagged: bool,
}

impl FakeCompletion {
    fn new() -> Self {
        Self {
            prompts: RefCell::new(Vec::new()),
            fail_calls: HashSet::new(),
            omit: None,
            reverse_tagged: false,
        }
    }

    fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }
}

fn cards_in(prompt: &str) -> Vec<String> {
    prompt
        .lines()
        .filter_map(|l| l.strip_prefix("Card "))
        .map(str::to_string)
        .collect()
}

fn block(name: &str, omit: Option<Field>) -> String {
    let mut out = String::new();
    for field in Field::ALL {
        if Some(field) == omit {
            continue;
        }
        let value = match field {
            Field::FirstName => name.to_string(),
            Field::LastName => "Tester".to_string(),
            Field::Email => format!("{}@example.com", name),
            Field::Phone1 => "555-0100 (work)".to_string(),
            Field::Phone2 | Field::Phone3 => "N/A".to_string(),
            Field::Zip => "99999".to_string(),
            _ => "x".to_string(),
        };
        out.push_str(&format!("**{}:** {}\n", field.label(), value));
    }
    out
}

impl CompletionService for FakeCompletion {
    fn name(&self) -> &str {
        "fake-model"
    }

    fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let call = self.calls();
        self.prompts.borrow_mut().push(prompt.to_string());
        if self.fail_calls.contains(&call) {
            return Err(CompletionError::Service {
                status: 429,
                body: "Resource exhausted".to_string(),
            });
        }
        let tagged = prompt.contains("[Record 1]");
        let mut blocks: Vec<String> = cards_in(prompt)
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let tag = if tagged {
                    format!("**Record:** {}\n", i + 1)
                } else {
                    String::new()
                };
                format!("{}{}", tag, block(name, self.omit))
            })
            .collect();
        if self.reverse_tagged {
            blocks.reverse();
        }
        Ok(blocks.join("\n"))
    }
}

#[derive(Default)]
struct RecordingSink {
    rows: Vec<OutputRow>,
    persisted: Vec<usize>,
    persist_calls: usize,
    fail_persist_calls: HashSet<usize>,
}

impl ProgressSink for RecordingSink {
    fn append_batch(&mut self, rows: Vec<OutputRow>) {
        self.rows.extend(rows);
    }

    fn persist(&mut self) -> Result<(), SinkError> {
        let call = self.persist_calls;
        self.persist_calls += 1;
        if self.fail_persist_calls.contains(&call) {
            return Err(SinkError::Locked);
        }
        self.persisted.push(self.rows.len());
        Ok(())
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }
}

fn images(n: usize) -> Vec<ImageRef> {
    (0..n)
        .map(|i| ImageRef::new(format!("/cards/img_{:02}.png", i)))
        .collect()
}

fn config(batch_size: usize, tag_records: bool) -> PipelineConfig {
    PipelineConfig::new(batch_size, 10, Duration::ZERO, tag_records).unwrap()
}

#[test]
fn test_twelve_images_two_batches() {
    let imgs = images(12);
    let ocr = FakeOcr::new();
    let completion = FakeCompletion::new();
    let mut sink = RecordingSink::default();

    let summary = run_pipeline(&imgs, &config(10, true), &ocr, &completion, &mut sink);

    assert_eq!(ocr.calls.get(), 12);
    assert_eq!(completion.calls(), 2);
    assert_eq!(summary.rows_written, 12);
    assert_eq!(sink.rows.len(), 12);
    let serials: Vec<u32> = sink.rows.iter().map(|r| r.serial).collect();
    assert_eq!(serials, (1..=12).collect::<Vec<u32>>());
    // After batch 1, after batch 2, then the final save.
    assert_eq!(sink.persisted, vec![10, 12, 12]);

    for row in &sink.rows {
        assert_eq!(row.record.get(Field::FirstName), row.image_name);
        assert_eq!(row.record.get(Field::Phone1), "555-0100");
        assert_eq!(row.record.get(Field::Phone2), "");
        assert_eq!(row.record.get(Field::Zip), "");
    }
}

#[test]
fn test_all_failed_batch_sends_nothing() {
    let imgs = images(25);
    let failing = (10..20).map(|i| format!("img_{:02}.png", i));
    let ocr = FakeOcr::failing(failing);
    let completion = FakeCompletion::new();
    let mut sink = RecordingSink::default();

    let summary = run_pipeline(&imgs, &config(10, true), &ocr, &completion, &mut sink);

    // ceil(25 / 10) = 3 windows, one of which had no text at all.
    assert_eq!(completion.calls(), 2);
    assert_eq!(summary.empty_batches, 1);
    assert_eq!(summary.ocr_failures, 10);
    assert_eq!(sink.rows.len(), 15);
    assert_eq!(sink.rows[10].image_name, "img_20.png");
    assert_eq!(sink.rows[10].serial, 11);
}

#[test]
fn test_failed_ocr_does_not_shift_alignment() {
    let imgs = images(5);
    let ocr = FakeOcr::failing(["img_02.png".to_string()]);
    let completion = FakeCompletion::new();
    let mut sink = RecordingSink::default();

    run_pipeline(&imgs, &config(10, false), &ocr, &completion, &mut sink);

    let names: Vec<&str> = sink.rows.iter().map(|r| r.image_name.as_str()).collect();
    assert_eq!(names, vec!["img_00.png", "img_01.png", "img_03.png", "img_04.png"]);
    for row in &sink.rows {
        assert_eq!(row.record.get(Field::FirstName), row.image_name);
    }
}

#[test]
fn test_missing_email_block_leaves_blank_emails() {
    let imgs = images(4);
    let ocr = FakeOcr::new();
    let completion = FakeCompletion {
        omit: Some(Field::Email),
        ..FakeCompletion::new()
    };
    let mut sink = RecordingSink::default();

    let summary = run_pipeline(&imgs, &config(10, false), &ocr, &completion, &mut sink);

    assert_eq!(sink.rows.len(), 4);
    assert!(sink.rows.iter().all(|r| r.record.get(Field::Email).is_empty()));
    assert!(sink.rows.iter().all(|r| r.record.get(Field::LastName) == "Tester"));
    assert_eq!(summary.alignment_warnings, 1);
}

#[test]
fn test_completion_error_drops_only_that_batch() {
    let imgs = images(25);
    let ocr = FakeOcr::new();
    let completion = FakeCompletion {
        fail_calls: [1].into_iter().collect(),
        ..FakeCompletion::new()
    };
    let mut sink = RecordingSink::default();

    let summary = run_pipeline(&imgs, &config(10, true), &ocr, &completion, &mut sink);

    assert_eq!(completion.calls(), 3);
    assert_eq!(summary.batches_failed, 1);
    assert_eq!(summary.unrecorded_images, 10);
    assert_eq!(sink.rows.len(), 15);
    assert_eq!(sink.rows[9].image_name, "img_09.png");
    assert_eq!(sink.rows[10].image_name, "img_20.png");
    assert_eq!(sink.rows[10].serial, 11);
    assert_eq!(sink.persisted, vec![10, 15, 15]);
}

#[test]
fn test_persist_failure_is_retried_at_next_boundary() {
    let imgs = images(6);
    let ocr = FakeOcr::new();
    let completion = FakeCompletion::new();
    let mut sink = RecordingSink {
        fail_persist_calls: [0].into_iter().collect(),
        ..RecordingSink::default()
    };

    let summary = run_pipeline(&imgs, &config(3, true), &ocr, &completion, &mut sink);

    assert_eq!(summary.persist_failures, 1);
    assert_eq!(sink.persisted, vec![6, 6]);
    assert_eq!(sink.rows.len(), 6);
}

#[test]
fn test_row_count_matches_persisted_after_every_batch() {
    let imgs = images(7);
    let ocr = FakeOcr::failing(["img_04.png".to_string()]);
    let completion = FakeCompletion::new();
    let mut sink = RecordingSink::default();

    run_pipeline(&imgs, &config(2, true), &ocr, &completion, &mut sink);

    // Windows: [0,1] [2,3] [4,5] [6]; image 4 has no text.
    assert_eq!(sink.persisted, vec![2, 4, 5, 6, 6]);
}

#[test]
fn test_tagged_blocks_out_of_order_are_realigned() {
    let imgs = images(3);
    let ocr = FakeOcr::new();
    let completion = FakeCompletion {
        reverse_tagged: true,
        ..FakeCompletion::new()
    };
    let mut sink = RecordingSink::default();

    let summary = run_pipeline(&imgs, &config(10, true), &ocr, &completion, &mut sink);

    assert_eq!(summary.alignment_warnings, 0);
    for row in &sink.rows {
        assert_eq!(row.record.get(Field::FirstName), row.image_name);
    }
}

#[test]
fn test_phone_labels_remapped_before_prompting() {
    let imgs = images(1);
    let ocr = FakeOcr {
        extra: Some("**Fax:** 555-0199".to_string()),
        ..FakeOcr::new()
    };
    let completion = FakeCompletion::new();
    let mut sink = RecordingSink::default();

    run_pipeline(&imgs, &config(10, true), &ocr, &completion, &mut sink);

    let prompts = completion.prompts.borrow();
    assert!(prompts[0].contains("**Phone-1:** 555-0199"));
    assert!(!prompts[0].contains("**Fax:**"));
}

#[test]
fn test_cooldown_cadence_follows_window_offsets() {
    let imgs = images(4);
    let ocr = FakeOcr::new();
    let completion = FakeCompletion::new();
    let mut sink = RecordingSink::default();
    let config = PipelineConfig::new(2, 1, Duration::from_millis(1), true).unwrap();

    let summary = run_pipeline(&imgs, &config, &ocr, &completion, &mut sink);

    assert_eq!(summary.cooldowns, 2);
}

#[test]
fn test_xlsx_sink_end_to_end() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("extracted_details.xlsx");
    let imgs = images(12);
    let ocr = FakeOcr::new();
    let completion = FakeCompletion::new();
    let mut sink = XlsxSink::new(&path);

    let summary = run_pipeline(&imgs, &config(10, true), &ocr, &completion, &mut sink);

    assert_eq!(summary.rows_written, 12);
    let rows = read_rows(&path).unwrap();
    assert_eq!(rows.len(), 12);
    assert_eq!(rows[0][0], "1");
    assert_eq!(rows[11][0], "12");
    assert_eq!(rows[11][1], "img_11.png");
    assert_eq!(rows[11][8], "img_11.png@example.com");
}
