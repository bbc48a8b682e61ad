//! Core library for viewing Excel workbooks whose cells may contain HTML
//! markup
//!
//! Workbooks are decoded into dense grids, scanned for markup cells, and
//! displayed in either raw or sanitized form. The whole session persists
//! across restarts through a two-tier storage fallback.

pub mod config;
pub mod controller;
pub mod detect;
pub mod error;
pub mod index;
pub mod reader;
pub mod registry;
pub mod sanitize;
pub mod store;
pub mod writer;

pub use config::AppConfig;
pub use controller::{
    Export, Notifier, NoticeLevel, PersistedSession, Renderer, SessionState,
    ViewStateController, SESSION_KEY,
};
pub use error::{Error, Result};
pub use index::{MarkupCell, MarkupIndex};
pub use reader::{cell_reference, CellValue, Sheet, Workbook};
pub use registry::{FileIdentity, FileRegistry, ImportedFile, RenderCache, ViewMode};
pub use store::{Backend, FileBackend, PersistenceStore, QuotaBackend};
