//! Offline integration tests for labelscan.
//!
//! Model-backed operations run against a scripted in-memory `VisionModel`
//! that records every request, so batching, ordering, fan-out/fan-in and
//! error propagation are checked without network access. Image inputs are
//! generated with the `image` crate; no pdfium library is needed.

use futures::future::BoxFuture;
use futures::StreamExt;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use labelscan::pipeline::encode::encode_page;
use labelscan::{
    default_requirements, diff, rasterize, run_compliance_scan, run_difference_report,
    run_unified_comparison, scan_stream, transcribe, AnalysisConfig, Document, LabelScanError,
    ModelRequest, ModelResponse, OverlayCompositor, OverlayEvent, RasterPage,
    RequirementStatus, ScanProgressCallback, Session, SessionEvent, Slot, ViewportTransform,
    VisionModel,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;
use tokio_test::{assert_err, assert_ok};

// ── Test helpers ─────────────────────────────────────────────────────────────

type Responder = dyn Fn(&ModelRequest, usize) -> Result<String, LabelScanError> + Send + Sync;

/// A `VisionModel` whose answers come from a closure of (request, call index).
struct ScriptedModel {
    respond: Box<Responder>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    fn new(
        respond: impl Fn(&ModelRequest, usize) -> Result<String, LabelScanError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl VisionModel for ScriptedModel {
    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse, LabelScanError>> {
        let idx = {
            let mut reqs = self.requests.lock().unwrap();
            reqs.push(request.clone());
            reqs.len() - 1
        };
        let answer = (self.respond)(&request, idx);
        Box::pin(async move {
            answer.map(|text| ModelResponse {
                text,
                input_tokens: 10,
                output_tokens: 5,
            })
        })
    }
}

/// A `VisionModel` that holds the first two replies until both requests
/// have arrived, so it only completes when the callers overlap.
struct GatedModel {
    gate: Arc<Barrier>,
    calls: AtomicUsize,
}

impl GatedModel {
    fn new() -> Self {
        Self {
            gate: Arc::new(Barrier::new(2)),
            calls: AtomicUsize::new(0),
        }
    }
}

impl VisionModel for GatedModel {
    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse, LabelScanError>> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = Arc::clone(&self.gate);
        Box::pin(async move {
            if idx < 2 {
                gate.wait().await;
            }
            let text = if request.images.len() == 2 {
                "As imagens são iguais.".to_string()
            } else {
                format!("texto {idx}")
            };
            Ok(ModelResponse {
                text,
                input_tokens: 1,
                output_tokens: 1,
            })
        })
    }
}

/// Requirement labels listed as `N. label` lines in a compliance instruction.
fn listed_requirements(instruction: &str) -> Vec<String> {
    instruction
        .lines()
        .filter_map(|l| {
            let (num, rest) = l.split_once(". ")?;
            num.parse::<usize>().ok().map(|_| rest.to_string())
        })
        .collect()
}

/// A well-behaved compliance answer: one "Atendido" item per listed label.
fn answer_all_met(req: &ModelRequest) -> String {
    let items: Vec<serde_json::Value> = listed_requirements(&req.instruction)
        .into_iter()
        .map(|r| serde_json::json!({"requisito": r, "status": "Atendido", "justificativa": "ok"}))
        .collect();
    serde_json::to_string(&items).unwrap()
}

fn png_document(name: &str, img: RgbaImage) -> Document {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    Document::new(name, buf, "image/png").unwrap()
}

fn gray_page(name: &str, w: u32, h: u32, level: u8) -> RasterPage {
    let doc = png_document(name, RgbaImage::from_pixel(w, h, Rgba([level, level, level, 255])));
    rasterize(&doc, &AnalysisConfig::default()).unwrap()
}

fn numbered(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("Requisito {i}")).collect()
}

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl RecordingCallback {
    fn push(&self, e: String) {
        self.events.lock().unwrap().push(e);
    }
}

impl ScanProgressCallback for RecordingCallback {
    fn on_scan_start(&self, total_batches: usize, total_requirements: usize) {
        self.push(format!("start {total_batches} {total_requirements}"));
    }
    fn on_batch_start(&self, batch_num: usize, _total: usize) {
        self.push(format!("batch {batch_num}"));
    }
    fn on_batch_complete(&self, batch_num: usize, _total: usize, item_count: usize) {
        self.push(format!("done {batch_num} {item_count}"));
    }
    fn on_batch_error(&self, batch_num: usize, _total: usize, _error: &str) {
        self.push(format!("error {batch_num}"));
    }
    fn on_scan_complete(&self, total_items: usize) {
        self.push(format!("complete {total_items}"));
    }
}

// ── Compliance scan ──────────────────────────────────────────────────────────

#[tokio::test]
async fn thirteen_requirements_issue_three_ordered_batches() {
    let model = ScriptedModel::new(|req, _| Ok(answer_all_met(req)));
    let page = gray_page("label.png", 20, 20, 200);
    let reqs = numbered(13);

    let items = run_compliance_scan(model.clone(), &page, &reqs, &AnalysisConfig::default())
        .await
        .unwrap();

    let requests = model.requests();
    let sizes: Vec<usize> = requests
        .iter()
        .map(|r| listed_requirements(&r.instruction).len())
        .collect();
    assert_eq!(sizes, vec![5, 5, 3]);
    assert!(requests.iter().all(|r| r.structured && r.images.len() == 1));

    let names: Vec<&str> = items.iter().map(|i| i.requisito.as_str()).collect();
    assert_eq!(names, reqs.iter().map(String::as_str).collect::<Vec<_>>());
    assert!(items.iter().all(|i| i.status == RequirementStatus::Met));
}

#[tokio::test]
async fn batches_are_numbered_from_one() {
    let model = ScriptedModel::new(|req, _| Ok(answer_all_met(req)));
    let page = gray_page("label.png", 4, 4, 0);

    run_compliance_scan(model.clone(), &page, &numbered(7), &AnalysisConfig::default())
        .await
        .unwrap();

    let second = &model.requests()[1].instruction;
    assert!(second.contains("1. Requisito 6\n2. Requisito 7"));
}

#[tokio::test]
async fn fenced_batch_parses_like_bare_batch() {
    let model = ScriptedModel::new(|req, idx| {
        let body = answer_all_met(req);
        Ok(if idx == 1 {
            format!("Claro!\n```json\n{body}\n```")
        } else {
            body
        })
    });
    let page = gray_page("label.png", 4, 4, 0);

    let items = assert_ok!(
        run_compliance_scan(model, &page, &numbered(10), &AnalysisConfig::default()).await
    );
    assert_eq!(items.len(), 10);
    assert_eq!(items[9].requisito, "Requisito 10");
}

#[tokio::test]
async fn failing_batch_aborts_without_partial_results() {
    let model = ScriptedModel::new(|req, idx| {
        if idx == 1 {
            Err(LabelScanError::ExternalServiceError {
                attempts: 1,
                detail: "HTTP 503".into(),
            })
        } else {
            Ok(answer_all_met(req))
        }
    });
    let recorder = Arc::new(RecordingCallback::default());
    let config = AnalysisConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let page = gray_page("label.png", 4, 4, 0);

    let err = assert_err!(run_compliance_scan(model.clone(), &page, &numbered(13), &config).await);

    assert!(matches!(err, LabelScanError::ExternalServiceError { .. }));
    assert_eq!(model.requests().len(), 2, "third batch must not be sent");
    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec!["start 3 13", "batch 1", "done 1 5", "batch 2", "error 2"]
    );
}

#[tokio::test]
async fn malformed_batch_is_reported() {
    let model = ScriptedModel::new(|_, _| Ok("Não consegui ler o rótulo.".to_string()));
    let page = gray_page("label.png", 4, 4, 0);

    let err = run_compliance_scan(model.clone(), &page, &numbered(6), &AnalysisConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, LabelScanError::MalformedStructuredResponse { .. }));
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn short_batch_is_merged_as_returned() {
    // The model drops one requirement; the merge keeps what came back.
    let model = ScriptedModel::new(|req, _| {
        let mut items: Vec<serde_json::Value> = serde_json::from_str(&answer_all_met(req)).unwrap();
        items.pop();
        Ok(serde_json::to_string(&items).unwrap())
    });
    let page = gray_page("label.png", 4, 4, 0);

    let items = run_compliance_scan(model, &page, &numbered(5), &AnalysisConfig::default())
        .await
        .unwrap();
    assert_eq!(items.len(), 4);
}

#[tokio::test]
async fn stream_yields_batches_in_order_and_reports_completion() {
    let model = ScriptedModel::new(|req, _| Ok(answer_all_met(req)));
    let recorder = Arc::new(RecordingCallback::default());
    let config = AnalysisConfig::builder()
        .batch_size(4)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let page = gray_page("label.png", 4, 4, 0);
    let reqs = default_requirements();

    let mut stream = scan_stream(model, &page, &reqs, &config).unwrap();
    let mut seen = Vec::new();
    while let Some(batch) = stream.next().await {
        let batch = batch.unwrap();
        assert_eq!(batch.items.len(), batch.requirements.len());
        seen.push((batch.batch_num, batch.total_batches));
    }

    assert_eq!(seen, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    assert_eq!(
        recorder.events.lock().unwrap().last().map(String::as_str),
        Some("complete 13")
    );
}

#[tokio::test]
async fn empty_requirement_list_makes_no_calls() {
    let model = ScriptedModel::new(|req, _| Ok(answer_all_met(req)));
    let page = gray_page("label.png", 4, 4, 0);

    let items = run_compliance_scan(model.clone(), &page, &[], &AnalysisConfig::default())
        .await
        .unwrap();
    assert!(items.is_empty());
    assert!(model.requests().is_empty());
}

// ── Difference report and unified comparison ─────────────────────────────────

#[tokio::test]
async fn difference_report_transcribes_then_analyses_with_mask() {
    let a = gray_page("v1.png", 30, 20, 10);
    let b = gray_page("v2.png", 30, 20, 240);
    let a_data = encode_page(&a).unwrap().data;

    let model = ScriptedModel::new(move |req, _| {
        if req.structured {
            Ok("```json\n{\"sao_diferentes\": true, \"diferencas\": [\"Diferença visual: fundo\"]}\n```".into())
        } else if req.images[0].data == a_data {
            Ok("LOTE 001".into())
        } else {
            Ok("LOTE 002".into())
        }
    });
    let mask = diff(&a, &b);
    assert_eq!(mask.flagged_count(), 600);

    let report = assert_ok!(
        run_difference_report(model.as_ref(), &a, &b, &mask, &AnalysisConfig::default()).await
    );

    assert!(report.are_different);
    assert_eq!(report.differences, vec!["Diferença visual: fundo"]);

    let requests = model.requests();
    assert_eq!(requests.len(), 3);
    let ocr: Vec<&ModelRequest> = requests.iter().filter(|r| !r.structured).collect();
    assert_eq!(ocr.len(), 2);
    assert!(ocr.iter().all(|r| r.images.len() == 1));

    let analysis = requests.last().unwrap();
    assert!(analysis.structured);
    assert_eq!(analysis.images.len(), 3);
    assert!(analysis.instruction.contains("LOTE 001"));
    assert!(analysis.instruction.contains("LOTE 002"));
}

#[tokio::test]
async fn failed_transcription_skips_analysis() {
    let model = ScriptedModel::new(|req, _| {
        if req.structured {
            Ok("{\"sao_diferentes\": false}".into())
        } else {
            Err(LabelScanError::ApiTimeout { elapsed_ms: 60_000 })
        }
    });
    let a = gray_page("v1.png", 4, 4, 0);
    let b = gray_page("v2.png", 4, 4, 0);
    let mask = diff(&a, &b);

    let err = assert_err!(
        run_difference_report(model.as_ref(), &a, &b, &mask, &AnalysisConfig::default()).await
    );
    assert!(matches!(err, LabelScanError::ApiTimeout { .. }));
    assert!(model.requests().iter().all(|r| !r.structured));
}

#[tokio::test]
async fn identical_gray_images_read_as_equal() {
    let a = gray_page("a.png", 100, 100, 128);
    let b = gray_page("b.png", 100, 100, 128);
    assert!(diff(&a, &b).is_empty());

    let model = ScriptedModel::new(|req, _| {
        Ok(if req.images.len() == 2 {
            "AS IMAGENS SÃO IGUAIS. Nenhuma diferença encontrada.".into()
        } else {
            "Texto".into()
        })
    });

    let verdict = run_unified_comparison(model.as_ref(), &a, &b, &AnalysisConfig::default())
        .await
        .unwrap();
    assert!(!verdict.has_differences);

    let requests = model.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| !r.structured));
    assert_eq!(requests[2].images.len(), 2);
}

#[tokio::test]
async fn both_transcriptions_are_in_flight_together() {
    let model = GatedModel::new();
    let a = gray_page("a.png", 8, 8, 0);
    let b = gray_page("b.png", 8, 8, 0);

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        run_unified_comparison(&model, &a, &b, &AnalysisConfig::default()),
    )
    .await
    .expect("sequential transcriptions would never pass the gate");

    let verdict = assert_ok!(outcome);
    assert!(!verdict.has_differences);
    assert_eq!(model.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn different_verdict_and_paraphrase_both_read_as_different() {
    let a = gray_page("a.png", 8, 8, 0);
    let b = gray_page("b.png", 8, 8, 255);

    for summary in ["As imagens são diferentes: o lote mudou.", "São idênticas."] {
        let model = ScriptedModel::new(move |req, _| {
            Ok(if req.images.len() == 2 { summary.into() } else { "x".into() })
        });
        let verdict = run_unified_comparison(model.as_ref(), &a, &b, &AnalysisConfig::default())
            .await
            .unwrap();
        assert!(verdict.has_differences, "summary: {summary}");
        assert_eq!(verdict.summary, summary);
    }
}

#[tokio::test]
async fn custom_equality_phrase_is_honoured() {
    let a = gray_page("a.png", 8, 8, 0);
    let model = ScriptedModel::new(|req, _| {
        Ok(if req.images.len() == 2 { "Verdict: SAME".into() } else { "x".into() })
    });
    let config = AnalysisConfig::builder().equality_phrase("same").build().unwrap();

    let verdict = run_unified_comparison(model.as_ref(), &a, &a, &config).await.unwrap();
    assert!(!verdict.has_differences);
}

#[tokio::test]
async fn transcribe_uses_configured_prompt() {
    let model = ScriptedModel::new(|_, _| Ok("INGREDIENTES: farinha".into()));
    let page = gray_page("label.png", 4, 4, 0);
    let config = AnalysisConfig::builder()
        .ocr_prompt("Leia o rótulo.")
        .build()
        .unwrap();

    let text = transcribe(model.as_ref(), &page, &config).await.unwrap();
    assert_eq!(text, "INGREDIENTES: farinha");
    assert_eq!(model.requests()[0].instruction, "Leia o rótulo.");
}

// ── Pixel pipeline ───────────────────────────────────────────────────────────

#[test]
fn rasterised_images_keep_size_and_diff_crops() {
    let a = gray_page("wide.png", 40, 10, 0);
    let b = gray_page("tall.png", 10, 40, 0);
    assert_eq!((a.width(), a.height()), (40, 10));

    let mask = diff(&a, &b);
    assert_eq!((mask.width(), mask.height()), (10, 10));
    assert!(mask.is_empty());
}

#[test]
fn unsupported_document_is_rejected_before_rasterising() {
    let err = Document::new("notes.txt", b"plain text".to_vec(), "text/plain").unwrap_err();
    assert!(matches!(err, LabelScanError::UnsupportedFormat { .. }));
}

#[test]
fn overlay_zoom_pan_and_reset() {
    let a = gray_page("a.png", 200, 100, 0);
    let b = gray_page("b.png", 200, 100, 255);
    let mut compositor = OverlayCompositor::new(400.0, 400.0);

    for _ in 0..60 {
        compositor.handle(OverlayEvent::Wheel { delta_y: -100.0 });
    }
    assert_eq!(compositor.transform().scale, 5.0);

    compositor.handle(OverlayEvent::SetFocused(true));
    compositor.handle(OverlayEvent::PointerDown { x: 10.0, y: 10.0 });
    compositor.handle(OverlayEvent::PointerMove { x: 25.0, y: 5.0 });
    assert_eq!(compositor.transform().offset_x, 15.0);
    assert_eq!(compositor.transform().offset_y, -5.0);

    let frame = compositor.render(&a, &b).unwrap();
    assert_eq!(frame.transform, ViewportTransform::IDENTITY);
    assert_eq!(
        compositor.transform(),
        ViewportTransform {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0
        }
    );
    // 2:1 page in a square container fits to width.
    assert_eq!(frame.base.dimensions(), (400, 200));
}

#[test]
fn zoomed_session_export_differs_from_unzoomed() {
    let ramp = RgbaImage::from_fn(40, 40, |x, _| Rgba([(x * 6) as u8, 0, 0, 255]));
    let page = Arc::new(rasterize(&png_document("ramp.png", ramp), &AnalysisConfig::default()).unwrap());
    let mut session = Session::new(40.0, 40.0);
    session.handle(SessionEvent::Load {
        slot: Slot::First,
        page: Arc::clone(&page),
    });
    session.handle(SessionEvent::Load {
        slot: Slot::Second,
        page,
    });

    let plain = session.overlay_frame().unwrap().flatten();
    for _ in 0..20 {
        session.handle(SessionEvent::Overlay(OverlayEvent::Wheel { delta_y: -1.0 }));
    }
    assert_eq!(session.compositor().transform().scale, 3.0);
    let zoomed = session.overlay_frame().unwrap().flatten();

    assert_eq!(plain.dimensions(), (40, 40));
    assert_eq!(zoomed.dimensions(), (40, 40));
    assert_ne!(plain, zoomed);
}
