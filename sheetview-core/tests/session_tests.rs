//! End-to-end session behavior: import, scan, toggle, persistence and
//! restore, driven through test doubles for the display surface.

use std::path::Path;

use tempfile::tempdir;

use sheetview_core::controller::{NoticeLevel, Notifier, Renderer, ViewStateController};
use sheetview_core::error::Error;
use sheetview_core::index::MarkupIndex;
use sheetview_core::reader::{self, CellValue};
use sheetview_core::registry::{FileIdentity, ViewMode};
use sheetview_core::store::{
    PersistenceStore, QuotaBackend, DEFAULT_QUOTA_BYTES, DEFAULT_RETENTION_DAYS,
};
use sheetview_core::writer;
use sheetview_core::SessionState;

#[derive(Default)]
struct RecordingRenderer {
    /// (rows, cols, flagged cells, mode) per render call
    renders: Vec<(usize, usize, usize, ViewMode)>,
    clears: usize,
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, grid: &[Vec<CellValue>], markup: &MarkupIndex, mode: ViewMode) {
        let cols = grid.first().map(Vec::len).unwrap_or(0);
        self.renders.push((grid.len(), cols, markup.len(), mode));
    }

    fn clear(&mut self) {
        self.clears += 1;
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notices: Vec<(NoticeLevel, String)>,
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, level: NoticeLevel, message: &str) {
        self.notices.push((level, message.to_string()));
    }
}

type TestController = ViewStateController<RecordingRenderer, RecordingNotifier>;

fn controller_at(dir: &Path) -> TestController {
    let store = PersistenceStore::open(dir, DEFAULT_QUOTA_BYTES, DEFAULT_RETENTION_DAYS);
    ViewStateController::new(
        store,
        RecordingRenderer::default(),
        RecordingNotifier::default(),
        "sheetview",
    )
}

fn text(s: &str) -> CellValue {
    CellValue::Text(s.to_string())
}

fn sample_grid() -> Vec<Vec<CellValue>> {
    vec![
        vec![text("Name"), text("Snippet")],
        vec![text("ana"), text("<b>bold</b>")],
        vec![text("luis"), text("plain")],
    ]
}

fn workbook_bytes(sheets: &[(&str, Vec<Vec<CellValue>>)]) -> Vec<u8> {
    let owned: Vec<(String, Vec<Vec<CellValue>>)> = sheets
        .iter()
        .map(|(name, grid)| (name.to_string(), grid.clone()))
        .collect();
    writer::encode(&owned).unwrap()
}

fn import(controller: &mut TestController, name: &str, bytes: &[u8]) -> usize {
    controller
        .import(FileIdentity::new(name, bytes.len() as u64), None, bytes)
        .unwrap()
}

#[test]
fn reimport_of_same_file_replaces_entry() {
    let dir = tempdir().unwrap();
    let mut controller = controller_at(dir.path());
    let bytes = workbook_bytes(&[("Data", sample_grid())]);

    let first = import(&mut controller, "report.xlsx", &bytes);
    let again = import(&mut controller, "report.xlsx", &bytes);

    assert_eq!(first, again);
    assert_eq!(controller.registry().len(), 1);
    assert_eq!(controller.registry().active_index(), Some(first));
    assert_eq!(controller.state(), SessionState::Loaded);
}

#[test]
fn import_rejects_non_spreadsheet_names() {
    let dir = tempdir().unwrap();
    let mut controller = controller_at(dir.path());

    let result = controller.import(FileIdentity::new("notes.txt", 3), None, b"abc");
    assert!(matches!(result, Err(Error::Format(_))));
    assert!(controller.registry().is_empty());
}

#[test]
fn failed_decode_leaves_session_untouched() {
    let dir = tempdir().unwrap();
    let mut controller = controller_at(dir.path());
    let bytes = workbook_bytes(&[("Data", sample_grid())]);
    import(&mut controller, "good.xlsx", &bytes);

    let result = controller.import(FileIdentity::new("bad.xlsx", 9), None, b"not a zip");
    assert!(result.is_err());
    assert_eq!(controller.registry().len(), 1);
    assert_eq!(controller.registry().active_index(), Some(0));
}

#[test]
fn toggle_reuses_the_cached_scan() {
    let dir = tempdir().unwrap();
    let mut controller = controller_at(dir.path());
    let bytes = workbook_bytes(&[("Data", sample_grid())]);
    import(&mut controller, "report.xlsx", &bytes);

    controller.select_sheet("Data").unwrap();
    assert_eq!(controller.scan_count(), 1);
    assert_eq!(controller.state(), SessionState::Processed);
    assert_eq!(controller.view_mode(), ViewMode::Raw);

    controller.toggle_view_mode();
    assert_eq!(controller.view_mode(), ViewMode::Rendered);
    controller.toggle_view_mode();
    assert_eq!(controller.view_mode(), ViewMode::Raw);

    // Toggling never rescans
    assert_eq!(controller.scan_count(), 1);

    let renders = &controller.renderer().renders;
    assert_eq!(renders.len(), 3);
    // Same flagged set in every render
    assert!(renders.iter().all(|(_, _, flagged, _)| *flagged == 1));
    assert_eq!(renders[1].3, ViewMode::Rendered);
    assert_eq!(renders[2].3, ViewMode::Raw);
}

#[test]
fn select_sheet_errors() {
    let dir = tempdir().unwrap();
    let mut controller = controller_at(dir.path());

    assert!(matches!(
        controller.select_sheet("Data"),
        Err(Error::NoActiveFile)
    ));

    let bytes = workbook_bytes(&[("Data", sample_grid())]);
    import(&mut controller, "report.xlsx", &bytes);
    assert!(matches!(
        controller.select_sheet("Nope"),
        Err(Error::SheetNotFound(_))
    ));
    assert_eq!(controller.state(), SessionState::Loaded);
}

#[test]
fn switching_files_restores_their_cached_view() {
    let dir = tempdir().unwrap();
    let mut controller = controller_at(dir.path());
    let bytes_a = workbook_bytes(&[("Data", sample_grid())]);
    let bytes_b = workbook_bytes(&[("Other", sample_grid())]);

    import(&mut controller, "a.xlsx", &bytes_a);
    controller.select_sheet("Data").unwrap();
    controller.toggle_view_mode();
    assert_eq!(controller.view_mode(), ViewMode::Rendered);

    import(&mut controller, "b.xlsx", &bytes_b);
    assert_eq!(controller.state(), SessionState::Loaded);

    // Back to the first file: processed view and its mode, no rescan
    controller.select_file(0).unwrap();
    assert_eq!(controller.state(), SessionState::Processed);
    assert_eq!(controller.view_mode(), ViewMode::Rendered);
    assert_eq!(controller.scan_count(), 1);
}

#[test]
fn removal_reindexes_and_clears_active_display() {
    let dir = tempdir().unwrap();
    let mut controller = controller_at(dir.path());
    let bytes = workbook_bytes(&[("Data", sample_grid())]);

    import(&mut controller, "a.xlsx", &bytes);
    import(&mut controller, "b.xlsx", &bytes);
    import(&mut controller, "c.xlsx", &bytes);
    assert_eq!(controller.registry().active_index(), Some(2));

    // Removing an earlier entry keeps the active file the same logical one
    let removed = controller.remove_file(0).unwrap();
    assert_eq!(removed.name, "a.xlsx");
    assert_eq!(controller.registry().len(), 2);
    assert_eq!(controller.registry().active_index(), Some(1));

    // Removing the active entry empties the display
    controller.remove_file(1).unwrap();
    assert_eq!(controller.state(), SessionState::Empty);
    assert_eq!(controller.registry().active_index(), None);
    assert!(controller.renderer().clears >= 1);

    // Out of range is a no-op
    assert!(controller.remove_file(7).is_none());
    assert_eq!(controller.registry().len(), 1);
}

#[test]
fn session_restores_across_controllers_without_rescanning() {
    let dir = tempdir().unwrap();
    let bytes_a = workbook_bytes(&[("Data", sample_grid())]);
    let bytes_b = workbook_bytes(&[("Other", sample_grid())]);

    {
        let mut controller = controller_at(dir.path());
        import(&mut controller, "a.xlsx", &bytes_a);
        import(&mut controller, "b.xlsx", &bytes_b);
        controller.select_sheet("Other").unwrap();
        controller.toggle_view_mode();
        assert_eq!(controller.view_mode(), ViewMode::Rendered);
    }

    let mut restored = controller_at(dir.path());
    restored.restore();

    assert_eq!(restored.registry().len(), 2);
    assert_eq!(restored.registry().active_index(), Some(1));
    assert_eq!(restored.view_mode(), ViewMode::Rendered);
    assert_eq!(restored.state(), SessionState::Processed);
    // The processed view came back from its cache
    assert_eq!(restored.scan_count(), 0);
    assert_eq!(restored.renderer().renders.len(), 1);
    assert!(restored
        .notifier()
        .notices
        .iter()
        .any(|(level, msg)| *level == NoticeLevel::Success && msg.contains("Restored 2")));
}

#[test]
fn restore_with_nothing_saved_is_a_noop() {
    let dir = tempdir().unwrap();
    let mut controller = controller_at(dir.path());
    controller.restore();

    assert!(controller.registry().is_empty());
    assert_eq!(controller.state(), SessionState::Empty);
    assert!(controller.notifier().notices.is_empty());
}

#[test]
fn quota_limited_store_degrades_then_asks_for_reupload() {
    let dir = tempdir().unwrap();
    let quota_store = |p: &Path| {
        PersistenceStore::new(vec![Box::new(QuotaBackend::new(
            p,
            512,
            DEFAULT_RETENTION_DAYS,
        )) as Box<dyn sheetview_core::Backend>])
    };

    // A workbook whose serialized form cannot fit 512 bytes
    let big_grid = vec![
        vec![text("Header")],
        vec![text(&"x".repeat(600))],
    ];
    let bytes = workbook_bytes(&[("Data", big_grid)]);

    {
        let mut controller = ViewStateController::new(
            quota_store(dir.path()),
            RecordingRenderer::default(),
            RecordingNotifier::default(),
            "sheetview",
        );
        import(&mut controller, "big.xlsx", &bytes);
        // The save was slimmed, not refused
        assert!(controller.storage_ok());
    }

    let mut restored = ViewStateController::new(
        quota_store(dir.path()),
        RecordingRenderer::default(),
        RecordingNotifier::default(),
        "sheetview",
    );
    restored.restore();

    // The slimmed entry had no workbook payload: pruned with a notice
    assert!(restored.registry().is_empty());
    assert_eq!(restored.state(), SessionState::Empty);
    assert!(restored
        .notifier()
        .notices
        .iter()
        .any(|(level, msg)| *level == NoticeLevel::Warning && msg.contains("re-uploaded")));
}

#[test]
fn clear_all_removes_the_saved_session() {
    let dir = tempdir().unwrap();
    {
        let mut controller = controller_at(dir.path());
        let bytes = workbook_bytes(&[("Data", sample_grid())]);
        import(&mut controller, "report.xlsx", &bytes);
        controller.select_sheet("Data").unwrap();
        controller.clear_all();
        assert!(controller.registry().is_empty());
        assert_eq!(controller.view_mode(), ViewMode::Raw);
    }

    let mut restored = controller_at(dir.path());
    restored.restore();
    assert!(restored.registry().is_empty());
    assert_eq!(restored.state(), SessionState::Empty);
}

#[test]
fn unavailable_storage_warns_once_and_keeps_working() {
    let mut controller = ViewStateController::new(
        PersistenceStore::new(Vec::new()),
        RecordingRenderer::default(),
        RecordingNotifier::default(),
        "sheetview",
    );
    assert!(!controller.storage_ok());
    assert!(controller
        .notifier()
        .notices
        .iter()
        .any(|(level, msg)| *level == NoticeLevel::Warning && msg.contains("storage")));

    // The session still runs fully in memory
    let bytes = workbook_bytes(&[("Data", sample_grid())]);
    import(&mut controller, "report.xlsx", &bytes);
    controller.select_sheet("Data").unwrap();
    assert_eq!(controller.state(), SessionState::Processed);
    let errors = controller
        .notifier()
        .notices
        .iter()
        .filter(|(level, _)| *level == NoticeLevel::Error)
        .count();
    assert_eq!(errors, 0);
}

#[test]
fn export_sanitizes_flagged_cells_and_preserves_shape() {
    let dir = tempdir().unwrap();
    let mut controller = controller_at(dir.path());

    // Trailing empty column and row must survive the round trip
    let grid = vec![
        vec![text("Name"), text("Snippet"), CellValue::Empty],
        vec![
            text("ana"),
            text("<div onclick=\"x()\">hi</div>"),
            CellValue::Empty,
        ],
        vec![
            text("<script>x()</script>luis"),
            text("plain"),
            CellValue::Empty,
        ],
        vec![CellValue::Empty, CellValue::Empty, CellValue::Empty],
    ];
    let bytes = workbook_bytes(&[("Data", grid.clone())]);
    import(&mut controller, "report.xlsx", &bytes);
    controller.select_sheet("Data").unwrap();

    let export = controller.export_active().unwrap();
    assert_eq!(export.file_name, "sheetview_report_Data_processed.xlsx");

    let workbook = reader::decode(&export.bytes).unwrap();
    let rows = &workbook.sheets[0].rows;
    assert_eq!(rows.len(), grid.len());
    assert!(rows.iter().all(|r| r.len() == 3));

    // Exactly the two flagged cells differ, replaced by sanitized text
    assert_eq!(rows[1][1], text("<div>hi</div>"));
    assert_eq!(rows[2][0], text("luis"));
    assert_eq!(rows[0][1], text("Snippet"));
    assert_eq!(rows[1][0], text("ana"));
    assert_eq!(rows[2][1], text("plain"));
    assert_eq!(rows[3][2], CellValue::Empty);
}

#[test]
fn export_requires_a_processed_view() {
    let dir = tempdir().unwrap();
    let mut controller = controller_at(dir.path());
    assert!(matches!(
        controller.export_active(),
        Err(Error::NoActiveFile)
    ));

    let bytes = workbook_bytes(&[("Data", sample_grid())]);
    import(&mut controller, "report.xlsx", &bytes);
    // Loaded but not processed
    assert!(controller.export_active().is_err());
}

#[test]
fn bulk_export_covers_every_file_and_sheet() {
    let dir = tempdir().unwrap();
    let mut controller = controller_at(dir.path());
    let bytes_a = workbook_bytes(&[("Q1", sample_grid()), ("Q2", sample_grid())]);
    let bytes_b = workbook_bytes(&[("Data", sample_grid())]);
    import(&mut controller, "a.xlsx", &bytes_a);
    import(&mut controller, "b.xlsx", &bytes_b);

    let export = controller.export_all().unwrap();
    let workbook = reader::decode(&export.bytes).unwrap();
    assert_eq!(workbook.sheet_names(), vec!["a_Q1", "a_Q2", "b_Data"]);
    // Harmless markup passes through sanitization unchanged
    assert_eq!(workbook.sheets[0].rows[1][1], text("<b>bold</b>"));
    assert!(export.file_name.starts_with("sheetview_Export_"));
}
