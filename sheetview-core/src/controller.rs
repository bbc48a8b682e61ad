//! Session controller tying imports, scanning, rendering and persistence
//! together
//!
//! The controller owns all mutable session state. Output goes through the
//! injected [`Renderer`] and [`Notifier`] so the same core drives a terminal
//! front end and the test fakes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::index::MarkupIndex;
use crate::reader::{self, CellValue};
use crate::registry::{FileIdentity, FileRegistry, RenderCache, ViewMode};
use crate::store::PersistenceStore;
use crate::writer;

/// Storage key under which the whole session is persisted
pub const SESSION_KEY: &str = "sheetview_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Where the grid gets drawn
pub trait Renderer {
    fn render(&mut self, grid: &[Vec<CellValue>], markup: &MarkupIndex, mode: ViewMode);
    fn clear(&mut self);
}

/// Where user-facing notices go
pub trait Notifier {
    fn notify(&mut self, level: NoticeLevel, message: &str);
}

/// Lifecycle of the active file: nothing loaded, workbook decoded, or a
/// worksheet scanned and ready to display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Empty,
    Loaded,
    Processed,
}

/// On-disk shape of a saved session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub registry: FileRegistry,
    pub view_mode: ViewMode,
    pub last_updated: DateTime<Utc>,
}

/// A finished export: suggested download name plus the encoded workbook
#[derive(Debug, Clone)]
pub struct Export {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub struct ViewStateController<R: Renderer, N: Notifier> {
    registry: FileRegistry,
    view_mode: ViewMode,
    state: SessionState,
    store: PersistenceStore,
    renderer: R,
    notifier: N,
    storage_ok: bool,
    scan_count: u64,
    export_prefix: String,
}

impl<R: Renderer, N: Notifier> ViewStateController<R, N> {
    /// Build a controller over a store. Storage is self-tested once here;
    /// a failing store degrades the session to in-memory with one warning.
    pub fn new(
        store: PersistenceStore,
        renderer: R,
        mut notifier: N,
        export_prefix: impl Into<String>,
    ) -> Self {
        let storage_ok = store.self_test();
        if !storage_ok {
            notifier.notify(
                NoticeLevel::Warning,
                "storage is unavailable; this session will not survive a restart",
            );
        }
        Self {
            registry: FileRegistry::new(),
            view_mode: ViewMode::default(),
            state: SessionState::default(),
            store,
            renderer,
            notifier,
            storage_ok,
            scan_count: 0,
            export_prefix: export_prefix.into(),
        }
    }

    /// Decode and register an uploaded file, making it active.
    ///
    /// A decode failure leaves the session untouched. Re-importing a file
    /// with the same (name, size) replaces the earlier entry in place.
    pub fn import(
        &mut self,
        identity: FileIdentity,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<usize> {
        if !reader::is_spreadsheet_file(&identity.name, content_type) {
            return Err(Error::Format(format!(
                "'{}' is not an Excel workbook",
                identity.name
            )));
        }
        let workbook = reader::decode(bytes)?;
        let first_sheet = workbook.first_sheet().map(|s| s.name.clone());
        let name = identity.name.clone();

        let index = self.registry.add_or_replace(identity, workbook);
        if let Some(file) = self.registry.active_file_mut() {
            file.active_sheet = first_sheet;
        }
        self.state = SessionState::Loaded;
        self.persist();
        self.notifier
            .notify(NoticeLevel::Success, &format!("Loaded {name}"));
        Ok(index)
    }

    /// Scan a worksheet of the active file and display it.
    ///
    /// This is the only operation that scans for markup; the result is
    /// cached so toggles and restores reuse it.
    pub fn select_sheet(&mut self, name: &str) -> Result<()> {
        let view_mode = self.view_mode;
        let Some(file) = self.registry.active_file_mut() else {
            return Err(Error::NoActiveFile);
        };
        let Some(workbook) = file.workbook.as_ref() else {
            let msg = format!("{} needs to be re-uploaded", file.identity.name);
            self.notifier.notify(NoticeLevel::Warning, &msg);
            return Err(Error::Format(msg));
        };
        let sheet = workbook
            .get_sheet(name)
            .ok_or_else(|| Error::SheetNotFound(name.to_string()))?;
        let grid = sheet.rows.clone();
        let markup = MarkupIndex::build(&grid);
        self.scan_count += 1;

        file.active_sheet = Some(name.to_string());
        file.render_cache = Some(RenderCache {
            grid,
            markup,
            view_mode,
        });
        file.last_processed_at = Utc::now();
        self.state = SessionState::Processed;
        self.render_active();
        self.persist();
        Ok(())
    }

    /// Flip between raw and rendered display. Reuses the cached scan.
    pub fn toggle_view_mode(&mut self) {
        self.view_mode = self.view_mode.toggled();
        let mode = self.view_mode;
        if let Some(file) = self.registry.active_file_mut()
            && let Some(cache) = file.render_cache.as_mut()
        {
            cache.view_mode = mode;
        }
        self.render_active();
        self.persist();
    }

    /// Switch the active file. A file with a cached scan comes back in its
    /// processed view, including its view mode, without rescanning.
    pub fn select_file(&mut self, index: usize) -> Result<()> {
        let (cached_mode, has_workbook, name) = {
            let file = self.registry.set_active(index)?;
            (
                file.render_cache.as_ref().map(|c| c.view_mode),
                file.workbook.is_some(),
                file.identity.name.clone(),
            )
        };

        if let Some(mode) = cached_mode {
            self.view_mode = mode;
            self.state = SessionState::Processed;
            self.render_active();
        } else if has_workbook {
            self.state = SessionState::Loaded;
            self.renderer.clear();
        } else {
            self.state = SessionState::Empty;
            self.renderer.clear();
            self.notifier
                .notify(NoticeLevel::Warning, &format!("{name} needs to be re-uploaded"));
        }
        self.persist();
        Ok(())
    }

    /// Remove one file. Out-of-range indices are a no-op. Removing the
    /// active file clears the display.
    pub fn remove_file(&mut self, index: usize) -> Option<FileIdentity> {
        let was_active = self.registry.active_index() == Some(index);
        let removed = self.registry.remove(index)?;
        if was_active {
            self.state = SessionState::Empty;
            self.renderer.clear();
        }
        self.persist();
        Some(removed.identity)
    }

    /// Drop every file and the persisted session
    pub fn clear_all(&mut self) {
        self.registry.clear();
        self.view_mode = ViewMode::Raw;
        self.state = SessionState::Empty;
        self.renderer.clear();
        self.store.delete(SESSION_KEY);
    }

    /// Rehydrate a previous session from the store, if one exists.
    ///
    /// Entries whose workbook did not fit the backend quota are pruned with
    /// a notice asking for re-upload. A restored processed view comes back
    /// from its cache; nothing is rescanned.
    pub fn restore(&mut self) {
        let Some(encoded) = self.store.get(SESSION_KEY) else {
            return;
        };
        let session: PersistedSession = match serde_json::from_str(&encoded) {
            Ok(session) => session,
            Err(_) => {
                self.notifier.notify(
                    NoticeLevel::Warning,
                    "saved session could not be read and was discarded",
                );
                self.store.delete(SESSION_KEY);
                return;
            }
        };
        self.registry = session.registry;
        self.view_mode = session.view_mode;

        let degraded = self
            .registry
            .files()
            .iter()
            .filter(|f| f.workbook.is_none())
            .count();
        if degraded > 0 {
            self.registry.prune_incomplete();
            self.notifier.notify(
                NoticeLevel::Warning,
                &format!(
                    "{degraded} file(s) exceeded the storage quota and need to be re-uploaded"
                ),
            );
        }

        let (has_cache, cached_mode, has_workbook) = match self.registry.active_file() {
            Some(file) => (
                file.render_cache.is_some(),
                file.render_cache.as_ref().map(|c| c.view_mode),
                file.workbook.is_some(),
            ),
            None => (false, None, false),
        };
        if has_cache {
            if let Some(mode) = cached_mode {
                self.view_mode = mode;
            }
            self.state = SessionState::Processed;
            self.render_active();
        } else if has_workbook {
            self.state = SessionState::Loaded;
        } else {
            self.state = SessionState::Empty;
        }

        if degraded > 0 {
            self.persist();
        } else if !self.registry.is_empty() {
            self.notifier.notify(
                NoticeLevel::Success,
                &format!(
                    "Restored {} file(s) from previous session",
                    self.registry.len()
                ),
            );
        }
    }

    /// Export the active processed worksheet with markup cells replaced by
    /// their sanitized text. Header row and unflagged cells pass through.
    pub fn export_active(&self) -> Result<Export> {
        let file = self.registry.active_file().ok_or(Error::NoActiveFile)?;
        let cache = file
            .render_cache
            .as_ref()
            .ok_or_else(|| Error::Format("no processed worksheet to export".to_string()))?;
        let sheet_name = file
            .active_sheet
            .clone()
            .unwrap_or_else(|| "Sheet1".to_string());

        let grid = sanitized_grid(&cache.grid, &cache.markup);
        let base = writer::base_file_name(&file.identity.name);
        let bytes = writer::encode(&[(format!("{base}_{sheet_name}_processed"), grid)])?;
        Ok(Export {
            file_name: writer::single_export_name(&self.export_prefix, base, &sheet_name),
            bytes,
        })
    }

    /// Export every sheet of every imported file, sanitized, into one
    /// workbook
    pub fn export_all(&self) -> Result<Export> {
        let mut sheets = Vec::new();
        for file in self.registry.files() {
            let Some(workbook) = file.workbook.as_ref() else {
                continue;
            };
            let base = writer::base_file_name(&file.identity.name);
            for sheet in &workbook.sheets {
                let markup = MarkupIndex::build(&sheet.rows);
                let grid = sanitized_grid(&sheet.rows, &markup);
                sheets.push((format!("{base}_{}", sheet.name), grid));
            }
        }
        if sheets.is_empty() {
            return Err(Error::Format("no exportable files".to_string()));
        }
        let bytes = writer::encode(&sheets)?;
        Ok(Export {
            file_name: writer::bulk_export_name(&self.export_prefix),
            bytes,
        })
    }

    /// Redraw the active view from its cache
    pub fn refresh(&mut self) {
        self.render_active();
    }

    fn render_active(&mut self) {
        if let Some(file) = self.registry.active_file()
            && let Some(cache) = file.render_cache.as_ref()
        {
            self.renderer.render(&cache.grid, &cache.markup, self.view_mode);
        }
    }

    /// Save the session, slimming the payload step by step when the active
    /// backend enforces a quota: first workbooks go, then scan caches. A
    /// save that still fails leaves the session running in memory.
    fn persist(&mut self) {
        if !self.store.has_backend() {
            return;
        }
        match self.try_persist() {
            Ok(()) => self.storage_ok = true,
            Err(e) => {
                self.storage_ok = false;
                self.notifier.notify(
                    NoticeLevel::Error,
                    &format!("session could not be saved: {e}"),
                );
            }
        }
    }

    fn try_persist(&self) -> Result<()> {
        let mut session = PersistedSession {
            registry: self.registry.clone(),
            view_mode: self.view_mode,
            last_updated: Utc::now(),
        };
        let encoded = serde_json::to_string(&session)?;
        match self.store.put(SESSION_KEY, &encoded) {
            Ok(()) => return Ok(()),
            Err(Error::QuotaExceeded { .. }) => {}
            Err(e) => return Err(e),
        }

        for file in session.registry.files_mut() {
            file.workbook = None;
        }
        let encoded = serde_json::to_string(&session)?;
        match self.store.put(SESSION_KEY, &encoded) {
            Ok(()) => return Ok(()),
            Err(Error::QuotaExceeded { .. }) => {}
            Err(e) => return Err(e),
        }

        for file in session.registry.files_mut() {
            file.render_cache = None;
        }
        let encoded = serde_json::to_string(&session)?;
        self.store.put(SESSION_KEY, &encoded)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn registry(&self) -> &FileRegistry {
        &self.registry
    }

    pub fn scan_count(&self) -> u64 {
        self.scan_count
    }

    pub fn storage_ok(&self) -> bool {
        self.storage_ok
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }
}

/// Copy of a grid with every flagged cell replaced by its sanitized text
fn sanitized_grid(grid: &[Vec<CellValue>], markup: &MarkupIndex) -> Vec<Vec<CellValue>> {
    let mut out = grid.to_vec();
    for cell in markup.cells() {
        if let Some(value) = out.get_mut(cell.row).and_then(|r| r.get_mut(cell.col)) {
            *value = CellValue::Text(cell.sanitized.clone());
        }
    }
    out
}
