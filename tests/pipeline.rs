//! Integration tests for the conversion pipeline.
//!
//! Decks and templates are built in memory, and the model is a scripted
//! provider, so these run without network access or an API key.

mod common;

use chrono::{Local, TimeZone};
use common::*;
use pptx2sop::pipeline::render::DocxTemplate;
use pptx2sop::prompts::{DEFAULT_SCOPE, MANUAL_REVIEW_MESSAGE};
use pptx2sop::{
    convert, convert_batch, inspect_template, ConversionConfig, ConversionProgressCallback, DocumentContext,
    FailureKind, FileError, ModelReply, SopError, SopGenerator, Stage,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::assert_ok;

const CASSETTE_REPLY: &str = r#"{"objective":"Describe assembly of the filter cassette","scope":"This SOP applies to cassette line 2","responsibilities":"Operators assemble cassettes; QA inspects each lot","definitions":"DFF: Direct Filter Flow","mango_id":"","pptx_title":"Cassette Assembly Procedure"}"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            dir: TempDir::new().unwrap(),
        };
        std::fs::create_dir_all(ws.input()).unwrap();
        write_file(ws.dir.path(), "LS-sop.docx", &sop_template_bytes());
        ws
    }

    fn input(&self) -> std::path::PathBuf {
        self.dir.path().join("input")
    }

    fn outputs(&self) -> std::path::PathBuf {
        self.dir.path().join("outputs")
    }

    fn deck(&self, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        write_file(&self.input(), name, bytes)
    }

    fn config(&self, provider: Arc<ScriptedProvider>) -> ConversionConfig {
        ConversionConfig::builder()
            .template_path(self.dir.path().join("LS-sop.docx"))
            .output_dir(self.outputs())
            .user_name("Jane Doe")
            .provider(provider)
            .build()
            .unwrap()
    }
}

fn today_stamp() -> String {
    Local::now().date_naive().format("%Y%m%d").to_string()
}

#[tokio::test]
async fn cassette_deck_produces_filled_document() {
    let ws = Workspace::new();
    let deck = ws.deck("cassette_wi.pptx", &cassette_deck());
    let provider = Arc::new(ScriptedProvider::always(CASSETTE_REPLY, 1));
    let config = ConversionConfig {
        id_prefix: Some("MANGO-".into()),
        ..ws.config(provider.clone())
    };

    let generator = SopGenerator::new(&config).unwrap();
    let result = generator.process_file(&deck).await;

    assert!(result.is_success(), "error: {:?}", result.error);
    assert!(!result.degraded);
    assert_eq!(result.input_tokens, 900);
    let output = result.output.unwrap();
    assert_eq!(
        output,
        ws.outputs().join(format!("cassette_wi_SOP_{}.docx", today_stamp()))
    );

    let xml = document_xml(&output);
    assert!(xml.contains("DFF: Direct Filter Flow"));
    assert!(xml.contains("Cassette Assembly Procedure"));
    assert!(xml.contains("This SOP applies to cassette line 2"));
    assert!(xml.contains("Document: MANGO-"));
    assert!(xml.contains("See Mango File MANGO-"));
    assert!(xml.contains("Initial Release"));
    assert!(xml.contains("Jane Doe"));
    assert!(!xml.contains("{{"));
    assert!(!xml.contains("{%tr"));

    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 1);
    let prompt = &prompts[0];
    assert!(prompt.contains("\n\nPowerPoint Content:\nPresentation: cassette_wi.pptx\nTotal Slides: 3\n"));
    assert!(prompt.contains("--- Slide 3 ---\nTitle: Definitions\nContent:\n  • DFF: Direct Filter Flow\n"));
}

#[tokio::test]
async fn fenced_reply_renders_like_plain_json() {
    let reply = r#"{"objective":"X","mango_id":"MANGO-1","pptx_title":"Cassette"}"#;
    let fenced = format!("```json\n{reply}\n```");

    let mut documents = Vec::new();
    for text in [reply.to_string(), fenced] {
        let ws = Workspace::new();
        let deck = ws.deck("wi.pptx", &cassette_deck());
        let provider = Arc::new(ScriptedProvider::always(&text, 1));
        let generator = SopGenerator::new(&ws.config(provider)).unwrap();
        let result = generator.process_file(&deck).await;
        assert!(!result.degraded);
        documents.push(document_xml(&result.output.unwrap()));
    }
    assert_eq!(documents[0], documents[1]);
    assert!(documents[0].contains("See Mango File MANGO-1 -- Cassette."));
}

#[tokio::test]
async fn prose_reply_yields_degraded_document() {
    let ws = Workspace::new();
    let deck = ws.deck("wi.pptx", &cassette_deck());
    let provider = Arc::new(ScriptedProvider::always(
        "Cassette assembly overview\nThe deck describes how to assemble cassettes.",
        1,
    ));
    let generator = SopGenerator::new(&ws.config(provider)).unwrap();

    let result = generator.process_file(&deck).await;
    assert!(result.is_success());
    assert!(result.degraded);

    let xml = document_xml(&result.output.unwrap());
    assert!(xml.contains("Cassette assembly overview"));
    assert!(xml.contains(MANUAL_REVIEW_MESSAGE));
    assert!(xml.contains(DEFAULT_SCOPE));
    assert!(xml.contains(">N/A<"));
}

#[derive(Default)]
struct Counter {
    starts: AtomicUsize,
    completes: AtomicUsize,
    errors: AtomicUsize,
    batch_success: AtomicUsize,
}

impl ConversionProgressCallback for Counter {
    fn on_file_start(&self, _index: usize, _total: usize, _file: &str) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }
    fn on_file_complete(&self, _index: usize, _total: usize, _output: &Path) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }
    fn on_file_error(&self, _index: usize, _total: usize, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
    fn on_batch_complete(&self, _total: usize, success_count: usize) {
        self.batch_success.store(success_count, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn failing_middle_deck_is_absent_and_siblings_succeed() {
    let ws = Workspace::new();
    ws.deck("a.pptx", &cassette_deck());
    ws.deck("b.pptx", b"this is not a zip archive");
    ws.deck("c.pptx", &cassette_deck());

    let provider = Arc::new(ScriptedProvider::always(CASSETTE_REPLY, 2));
    let counter = Arc::new(Counter::default());
    let config = ConversionConfig {
        progress_callback: Some(counter.clone()),
        ..ws.config(provider.clone())
    };

    let batch = assert_ok!(convert(ws.input(), &config).await);

    let outputs = batch.outputs();
    assert_eq!(outputs.len(), 3);
    assert!(outputs[0].is_some());
    assert!(outputs[1].is_none());
    assert!(outputs[2].is_some());
    assert_eq!(
        batch.output_names(),
        vec![
            format!("a_SOP_{}.docx", today_stamp()),
            format!("c_SOP_{}.docx", today_stamp()),
        ]
    );

    let error = batch.files[1].error.as_ref().unwrap();
    assert_eq!(error.stage(), Stage::Extract);
    assert_eq!(error.file(), "b.pptx");

    assert_eq!(batch.stats.processed_files, 2);
    assert_eq!(batch.stats.failed_files, 1);
    assert_eq!(provider.prompts().len(), 2);

    assert_eq!(counter.starts.load(Ordering::SeqCst), 3);
    assert_eq!(counter.completes.load(Ordering::SeqCst), 2);
    assert_eq!(counter.errors.load(Ordering::SeqCst), 1);
    assert_eq!(counter.batch_success.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn model_failure_is_isolated() {
    let ws = Workspace::new();
    let a = ws.deck("a.pptx", &cassette_deck());
    let b = ws.deck("b.pptx", &cassette_deck());
    let provider = Arc::new(ScriptedProvider::new(vec![
        ModelReply::Failure {
            kind: FailureKind::Auth,
            message: "invalid x-api-key".into(),
        },
        success(CASSETTE_REPLY),
    ]));

    let batch = convert_batch(&[a, b], &ws.config(provider)).await.unwrap();
    assert!(matches!(
        batch.files[0].error,
        Some(FileError::AuthFailure { .. })
    ));
    assert!(batch.files[1].is_success());
}

#[tokio::test]
async fn concurrent_batch_keeps_input_order() {
    let ws = Workspace::new();
    let decks: Vec<_> = ["a", "b", "c", "d"]
        .iter()
        .map(|n| ws.deck(&format!("{n}.pptx"), &cassette_deck()))
        .collect();
    let provider = Arc::new(ScriptedProvider::always(CASSETTE_REPLY, 4));
    let config = ConversionConfig {
        concurrency: 3,
        ..ws.config(provider)
    };

    let batch = convert_batch(&decks, &config).await.unwrap();
    let sources: Vec<_> = batch.files.iter().map(|f| f.source.clone()).collect();
    assert_eq!(sources, decks);
    assert_eq!(batch.stats.processed_files, 4);
}

#[tokio::test]
async fn missing_template_stops_run_before_any_deck() {
    let ws = Workspace::new();
    let deck = ws.deck("a.pptx", &cassette_deck());
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let config = ConversionConfig {
        template_path: ws.dir.path().join("missing.docx"),
        ..ws.config(provider.clone())
    };

    let err = convert_batch(&[deck], &config).await.unwrap_err();
    assert!(matches!(err, SopError::TemplateNotFound { .. }));
    assert!(provider.prompts().is_empty());
    assert!(!ws.outputs().exists());
}

#[tokio::test]
async fn missing_credential_stops_run() {
    let ws = Workspace::new();
    let deck = ws.deck("a.pptx", &cassette_deck());
    let config = ConversionConfig {
        provider: None,
        api_key: None,
        ..ws.config(Arc::new(ScriptedProvider::new(vec![])))
    };

    let err = tokio_test::assert_err!(convert_batch(&[deck], &config).await);
    assert!(matches!(err, SopError::MissingCredential));
}

#[tokio::test]
async fn regenerating_same_day_overwrites() {
    let ws = Workspace::new();
    let deck = ws.deck("wi.pptx", &cassette_deck());
    let provider = Arc::new(ScriptedProvider::always(CASSETTE_REPLY, 2));
    let generator = SopGenerator::new(&ws.config(provider)).unwrap();

    let first = generator.process_file(&deck).await.output.unwrap();
    let second = generator.process_file(&deck).await.output.unwrap();
    assert_eq!(first, second);
    assert_eq!(std::fs::read_dir(ws.outputs()).unwrap().count(), 1);
}

#[test]
fn rendering_same_context_is_byte_identical() {
    let template = DocxTemplate::from_bytes("LS-sop.docx", sop_template_bytes()).unwrap();
    let today = chrono::NaiveDate::from_ymd_opt(2024, 12, 15).unwrap();
    let mut context = DocumentContext::new("Jane Doe", today);
    context.title = "Cassette Assembly Procedure".into();
    context.document_id = "MANGO-7".into();
    context.objective = "Line one\nLine two".into();

    let when = Local.with_ymd_and_hms(2024, 12, 15, 8, 0, 0).unwrap();
    let a = template.render(&context.template_values(), when).unwrap();
    let b = template.render(&context.template_values(), when).unwrap();
    assert_eq!(a, b);

    let later = Local.with_ymd_and_hms(2024, 12, 15, 9, 0, 0).unwrap();
    let c = template.render(&context.template_values(), later).unwrap();
    assert_ne!(a, c);
}

#[test]
fn template_check_flags_fields_documents_cannot_fill() {
    let dir = TempDir::new().unwrap();
    let good = write_file(dir.path(), "LS-sop.docx", &sop_template_bytes());
    let report = inspect_template(&good).unwrap();
    assert!(report.is_renderable(), "{report:?}");
    assert!(report.placeholders.contains(&"procedure_text".to_string()));
    assert!(report.placeholders.contains(&"revision.changed_by".to_string()));
    assert!(report.placeholders.contains(&"generator_version".to_string()));
    assert_eq!(report.row_loops.len(), 1);
    assert_eq!(report.row_loops[0].list, "revisions");

    let extended = write_file(
        dir.path(),
        "approval.docx",
        &sop_template_with(&["Approved by {{ approver }}"]),
    );
    let report = inspect_template(&extended).unwrap();
    assert!(!report.is_renderable());
    assert_eq!(report.unknown, vec!["approver"]);

    let missing = inspect_template(dir.path().join("nope.docx")).unwrap_err();
    assert!(matches!(missing, SopError::TemplateNotFound { .. }));
}
