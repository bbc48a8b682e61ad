//! Registry of imported workbooks and their processing state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::index::MarkupIndex;
use crate::reader::{CellValue, Workbook};

/// Raw shows original cell text; Rendered shows sanitized markup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViewMode {
    #[default]
    Raw,
    Rendered,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Raw => ViewMode::Rendered,
            ViewMode::Rendered => ViewMode::Raw,
        }
    }
}

/// Identity of an uploaded file. (name, size) is the de-duplication key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileIdentity {
    pub name: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl FileIdentity {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            last_modified: None,
        }
    }

    fn same_file(&self, other: &FileIdentity) -> bool {
        self.name == other.name && self.size == other.size
    }
}

/// Cached result of scanning one worksheet, persisted with the session so a
/// restore can reach the processed view without rescanning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderCache {
    pub grid: Vec<Vec<CellValue>>,
    pub markup: MarkupIndex,
    pub view_mode: ViewMode,
}

/// One user-imported workbook plus its bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportedFile {
    pub identity: FileIdentity,
    /// Absent when a restored session could not hold the full payload
    pub workbook: Option<Workbook>,
    pub active_sheet: Option<String>,
    pub render_cache: Option<RenderCache>,
    pub last_processed_at: DateTime<Utc>,
}

/// Ordered collection of imported files; insertion order is display order.
///
/// Invariant: `active` is `None` or a valid index into `files`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileRegistry {
    files: Vec<ImportedFile>,
    active: Option<usize>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoded workbook and make it active.
    ///
    /// A file matching an existing (name, size) replaces that entry in place,
    /// keeping its slot stable; anything else appends. Returns the index.
    pub fn add_or_replace(&mut self, identity: FileIdentity, workbook: Workbook) -> usize {
        let entry = ImportedFile {
            identity,
            workbook: Some(workbook),
            active_sheet: None,
            render_cache: None,
            last_processed_at: Utc::now(),
        };

        let index = match self
            .files
            .iter()
            .position(|f| f.identity.same_file(&entry.identity))
        {
            Some(existing) => {
                self.files[existing] = entry;
                existing
            }
            None => {
                self.files.push(entry);
                self.files.len() - 1
            }
        };
        self.active = Some(index);
        index
    }

    /// Remove an entry. Out-of-range indices are a no-op returning `None`.
    ///
    /// Removing the active entry clears the active selection; removing an
    /// entry before it shifts the active index down so it keeps pointing at
    /// the same logical file.
    pub fn remove(&mut self, index: usize) -> Option<ImportedFile> {
        if index >= self.files.len() {
            return None;
        }
        let removed = self.files.remove(index);
        self.active = match self.active {
            Some(active) if active == index => None,
            Some(active) if active > index => Some(active - 1),
            other => other,
        };
        Some(removed)
    }

    pub fn set_active(&mut self, index: usize) -> Result<&ImportedFile> {
        if index >= self.files.len() {
            return Err(Error::NotFound(index));
        }
        self.active = Some(index);
        Ok(&self.files[index])
    }

    /// Drop entries without a usable workbook; returns how many were removed.
    ///
    /// Such entries appear after a restore whose persisted payload exceeded
    /// the backend quota. The active selection survives if its entry does.
    pub fn prune_incomplete(&mut self) -> usize {
        let before = self.files.len();
        let old_active = self.active;
        let mut new_active = None;
        let mut kept = Vec::with_capacity(before);

        for (index, file) in std::mem::take(&mut self.files).into_iter().enumerate() {
            if file.workbook.is_some() {
                if old_active == Some(index) {
                    new_active = Some(kept.len());
                }
                kept.push(file);
            }
        }

        self.files = kept;
        self.active = new_active;
        before - self.files.len()
    }

    pub fn clear(&mut self) {
        self.files.clear();
        self.active = None;
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active_file(&self) -> Option<&ImportedFile> {
        self.active.and_then(|i| self.files.get(i))
    }

    pub fn active_file_mut(&mut self) -> Option<&mut ImportedFile> {
        match self.active {
            Some(i) => self.files.get_mut(i),
            None => None,
        }
    }

    pub fn files(&self) -> &[ImportedFile] {
        &self.files
    }

    pub(crate) fn files_mut(&mut self) -> &mut [ImportedFile] {
        &mut self.files
    }

    pub fn get(&self, index: usize) -> Option<&ImportedFile> {
        self.files.get(index)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Sheet;

    fn workbook(sheet_name: &str) -> Workbook {
        Workbook {
            sheets: vec![Sheet::new(sheet_name.to_string())],
        }
    }

    #[test]
    fn test_reimport_same_identity_replaces_in_place() {
        let mut registry = FileRegistry::new();
        let first = registry.add_or_replace(FileIdentity::new("a.xlsx", 100), workbook("One"));
        registry.add_or_replace(FileIdentity::new("b.xlsx", 200), workbook("Other"));

        // Same (name, size): second import wins, slot is stable, entry active
        let again = registry.add_or_replace(FileIdentity::new("a.xlsx", 100), workbook("Two"));
        assert_eq!(first, again);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.active_index(), Some(first));
        let sheets = registry.get(first).unwrap().workbook.as_ref().unwrap();
        assert_eq!(sheets.sheet_names(), vec!["Two"]);
    }

    #[test]
    fn test_same_name_different_size_appends() {
        let mut registry = FileRegistry::new();
        registry.add_or_replace(FileIdentity::new("a.xlsx", 100), workbook("One"));
        registry.add_or_replace(FileIdentity::new("a.xlsx", 101), workbook("Two"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_removal_reindexes_active() {
        let mut registry = FileRegistry::new();
        registry.add_or_replace(FileIdentity::new("a.xlsx", 1), workbook("A"));
        registry.add_or_replace(FileIdentity::new("b.xlsx", 2), workbook("B"));
        registry.add_or_replace(FileIdentity::new("c.xlsx", 3), workbook("C"));
        assert_eq!(registry.active_index(), Some(2));

        // Removing an entry before the active one shifts it down
        registry.remove(0);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.active_index(), Some(1));
        assert_eq!(registry.active_file().unwrap().identity.name, "c.xlsx");
    }

    #[test]
    fn test_removing_active_clears_selection() {
        let mut registry = FileRegistry::new();
        registry.add_or_replace(FileIdentity::new("a.xlsx", 1), workbook("A"));
        registry.add_or_replace(FileIdentity::new("b.xlsx", 2), workbook("B"));
        registry.set_active(0).unwrap();

        registry.remove(0);
        assert_eq!(registry.active_index(), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_out_of_range_is_noop() {
        let mut registry = FileRegistry::new();
        registry.add_or_replace(FileIdentity::new("a.xlsx", 1), workbook("A"));
        assert!(registry.remove(5).is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.active_index(), Some(0));
    }

    #[test]
    fn test_set_active_out_of_range() {
        let mut registry = FileRegistry::new();
        registry.add_or_replace(FileIdentity::new("a.xlsx", 1), workbook("A"));
        assert!(matches!(registry.set_active(3), Err(Error::NotFound(3))));
        // Selection untouched by the failed call
        assert_eq!(registry.active_index(), Some(0));
    }

    #[test]
    fn test_prune_incomplete() {
        let mut registry = FileRegistry::new();
        registry.add_or_replace(FileIdentity::new("a.xlsx", 1), workbook("A"));
        registry.add_or_replace(FileIdentity::new("b.xlsx", 2), workbook("B"));
        registry.add_or_replace(FileIdentity::new("c.xlsx", 3), workbook("C"));
        registry.set_active(2).unwrap();
        registry.files_mut()[0].workbook = None;

        let pruned = registry.prune_incomplete();
        assert_eq!(pruned, 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.active_file().unwrap().identity.name, "c.xlsx");
    }

    #[test]
    fn test_prune_drops_active_without_workbook() {
        let mut registry = FileRegistry::new();
        registry.add_or_replace(FileIdentity::new("a.xlsx", 1), workbook("A"));
        registry.files_mut()[0].workbook = None;

        assert_eq!(registry.prune_incomplete(), 1);
        assert!(registry.is_empty());
        assert_eq!(registry.active_index(), None);
    }
}
