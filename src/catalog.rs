//! The image catalog: what is in the managed directory and which images are
//! hidden from slideshows.
//!
//! A [`Catalog`] owns a [`Workspace`] (the directory plus the location of its
//! config document), the loaded [`Settings`] and the entries found by the last
//! scan. Every change to the hidden set is written through to the
//! [`ConfigStore`] before the mutating call returns. When that write fails the
//! change is kept in memory and the error is queued for the caller, see
//! [`Catalog::take_warnings`].
//!
//! Sorting and filtering are free functions over owned entry lists so the
//! presentation layer can combine them however it likes.

use crate::config::{ConfigError, ConfigStore, HiddenSet, Settings, CONFIG_FILE};
use chrono::{DateTime, Local};
use image::ImageFormat;
use rayon::prelude::*;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;
use thiserror::Error;

/// Formats accepted by scan and add. Anything else is ignored.
pub const SUPPORTED_FORMATS: [ImageFormat; 2] = [ImageFormat::Jpeg, ImageFormat::Png];

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Could not read directory {}: {source}", .dir.display())]
    Scan { dir: PathBuf, source: io::Error },
    #[error("No image at {}", .0.display())]
    NotFound(PathBuf),
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),
    #[error("File '{}' already exists", .to.display())]
    RenameConflict { from: PathBuf, to: PathBuf },
    #[error("Failed to rename {} to {}: {source}", .from.display(), .to.display())]
    RenameIo {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("Failed to delete {}: {source}", .path.display())]
    DeleteIo { path: PathBuf, source: io::Error },
}

/// Why a file was left out of a scan or an add.
#[derive(Error, Debug)]
pub enum SkipReason {
    #[error("unsupported image format")]
    Unsupported,
    #[error("a file with this name already exists")]
    AlreadyExists,
    #[error("{0}")]
    Io(#[from] io::Error),
}

#[derive(Debug)]
pub struct Skipped {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// The managed directory and where its configuration lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    config_path: PathBuf,
}

impl Workspace {
    /// Use `dir` with the config document stored inside it.
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        let root = canonical_dir(dir.as_ref())?;
        let config_path = root.join(CONFIG_FILE);
        Ok(Self { root, config_path })
    }

    /// Use `dir` with the config document at an explicit location.
    pub fn with_config(dir: impl AsRef<Path>, config_path: impl Into<PathBuf>) -> io::Result<Self> {
        let root = canonical_dir(dir.as_ref())?;
        Ok(Self {
            root,
            config_path: config_path.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

fn canonical_dir(dir: &Path) -> io::Result<PathBuf> {
    let root = fs::canonicalize(dir)?;
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", root.display()),
        ));
    }
    Ok(root)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub path: PathBuf,
    pub display_name: String,
    pub size_bytes: u64,
    pub modified: SystemTime,
    pub hidden: bool,
}

impl ImageEntry {
    fn from_metadata(path: PathBuf, metadata: &fs::Metadata, hidden: &HiddenSet) -> io::Result<Self> {
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            hidden: hidden.contains(&path),
            display_name,
            size_bytes: metadata.len(),
            modified: metadata.modified()?,
            path,
        })
    }

    pub fn modified_local(&self) -> DateTime<Local> {
        DateTime::from(self.modified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Case-insensitive, ascending.
    #[default]
    Name,
    /// Newest first.
    Modified,
    /// Largest first.
    Size,
}

impl SortKey {
    pub const NAMES: [&'static str; 3] = ["name", "modified", "size"];
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "modified" | "date" | "date modified" => Ok(SortKey::Modified),
            "size" | "file size" => Ok(SortKey::Size),
            other => Err(format!("Unknown sort key: {}", other)),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SortKey::Name => "name",
            SortKey::Modified => "modified",
            SortKey::Size => "size",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub entries: Vec<ImageEntry>,
    pub skipped: Vec<Skipped>,
}

#[derive(Debug, Default)]
pub struct AddReport {
    pub added: Vec<ImageEntry>,
    pub skipped: Vec<Skipped>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CatalogStats {
    pub total: usize,
    pub visible: usize,
    pub hidden: usize,
    pub total_bytes: u64,
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(ImageFormat::from_extension)
        .map_or(false, |format| SUPPORTED_FORMATS.contains(&format))
}

/// List the supported images directly inside `dir`, without descending.
///
/// Files whose metadata cannot be read are reported in
/// [`ScanReport::skipped`] rather than failing the scan.
pub fn scan(dir: &Path, hidden: &HiddenSet) -> Result<ScanReport, CatalogError> {
    let read_dir = fs::read_dir(dir).map_err(|source| CatalogError::Scan {
        dir: dir.to_path_buf(),
        source,
    })?;

    let candidates: Vec<PathBuf> = read_dir
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                log::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|path| is_supported_image(path))
        .collect();

    let stats: Vec<(PathBuf, io::Result<fs::Metadata>)> = candidates
        .into_par_iter()
        .map(|path| {
            let metadata = fs::metadata(&path);
            (path, metadata)
        })
        .collect();

    let mut report = ScanReport::default();
    for (path, metadata) in stats {
        let entry = metadata.and_then(|m| {
            if m.is_file() {
                ImageEntry::from_metadata(path.clone(), &m, hidden).map(Some)
            } else {
                Ok(None)
            }
        });
        match entry {
            Ok(Some(entry)) => report.entries.push(entry),
            Ok(None) => {}
            Err(e) => {
                log::warn!("Cannot read {}: {}", path.display(), e);
                report.skipped.push(Skipped {
                    path,
                    reason: SkipReason::Io(e),
                });
            }
        }
    }

    log::debug!(
        "Found {} image files in {}",
        report.entries.len(),
        dir.display()
    );
    Ok(report)
}

/// Stable sort by `key`.
pub fn sort(mut entries: Vec<ImageEntry>, key: SortKey) -> Vec<ImageEntry> {
    match key {
        SortKey::Name => entries.sort_by_key(|e| e.display_name.to_lowercase()),
        SortKey::Modified => entries.sort_by(|a, b| b.modified.cmp(&a.modified)),
        SortKey::Size => entries.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes)),
    }
    entries
}

/// Keep entries whose name contains `query`, ignoring case.
pub fn filter(entries: Vec<ImageEntry>, query: &str) -> Vec<ImageEntry> {
    if query.is_empty() {
        return entries;
    }
    let query = query.to_lowercase();
    entries
        .into_iter()
        .filter(|e| e.display_name.to_lowercase().contains(&query))
        .collect()
}

/// Paths of the entries that are not hidden, in the given order.
pub fn visible_paths(entries: &[ImageEntry]) -> Vec<PathBuf> {
    entries
        .iter()
        .filter(|e| !e.hidden)
        .map(|e| e.path.clone())
        .collect()
}

pub fn summarize(entries: &[ImageEntry]) -> CatalogStats {
    let hidden = entries.iter().filter(|e| e.hidden).count();
    CatalogStats {
        total: entries.len(),
        visible: entries.len() - hidden,
        hidden,
        total_bytes: entries.iter().map(|e| e.size_bytes).sum(),
    }
}

pub struct Catalog {
    workspace: Workspace,
    store: ConfigStore,
    settings: Settings,
    entries: Vec<ImageEntry>,
    skipped: Vec<Skipped>,
    warnings: Vec<ConfigError>,
}

impl Catalog {
    /// Load the workspace configuration and scan its directory.
    ///
    /// An unusable config document is not fatal: the catalog starts with an
    /// empty hidden set and the error is queued as a warning.
    pub fn open(workspace: Workspace) -> Result<Self, CatalogError> {
        let store = ConfigStore::new(workspace.config_path());
        let (settings, warning) = store.load_or_default();
        let mut catalog = Self {
            workspace,
            store,
            settings,
            entries: Vec::new(),
            skipped: Vec::new(),
            warnings: warning.into_iter().collect(),
        };
        catalog.rescan()?;
        Ok(catalog)
    }

    /// Replace the entries with a fresh scan of the workspace.
    pub fn rescan(&mut self) -> Result<&[Skipped], CatalogError> {
        let report = scan(self.workspace.root(), &self.settings.hidden)?;
        self.entries = report.entries;
        self.skipped = report.skipped;
        Ok(&self.skipped)
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn hidden(&self) -> &HiddenSet {
        &self.settings.hidden
    }

    /// Entries in scan order.
    pub fn entries(&self) -> &[ImageEntry] {
        &self.entries
    }

    /// Files the last scan could not read.
    pub fn skipped(&self) -> &[Skipped] {
        &self.skipped
    }

    pub fn get(&self, path: &Path) -> Option<&ImageEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ImageEntry> {
        self.entries.iter().find(|e| e.display_name == name)
    }

    /// Filtered and sorted copy of the entries.
    pub fn view(&self, key: SortKey, query: &str) -> Vec<ImageEntry> {
        sort(filter(self.entries.clone(), query), key)
    }

    pub fn stats(&self) -> CatalogStats {
        summarize(&self.entries)
    }

    /// Drain the configuration problems seen since the last call.
    pub fn take_warnings(&mut self) -> Vec<ConfigError> {
        std::mem::take(&mut self.warnings)
    }

    /// Where slideshows are written; the workspace root unless configured.
    pub fn output_directory(&self) -> PathBuf {
        self.settings
            .output_directory
            .clone()
            .unwrap_or_else(|| self.workspace.root().to_path_buf())
    }

    pub fn set_output_directory(&mut self, dir: Option<PathBuf>) {
        self.settings.output_directory = dir;
        self.persist();
    }

    pub fn set_preferred_player(&mut self, player: impl Into<String>) {
        self.settings.preferred_player = player.into();
        self.persist();
    }

    /// Flip the hidden flag of the entry at `path`. Returns the new value.
    pub fn toggle_hidden(&mut self, path: &Path) -> Result<bool, CatalogError> {
        let index = self.index_of(path)?;
        let hidden = !self.entries[index].hidden;
        self.apply_hidden(index, hidden);
        Ok(hidden)
    }

    /// Set the hidden flag. Returns whether anything changed.
    pub fn set_hidden(&mut self, path: &Path, hidden: bool) -> Result<bool, CatalogError> {
        let index = self.index_of(path)?;
        if self.entries[index].hidden == hidden {
            return Ok(false);
        }
        self.apply_hidden(index, hidden);
        Ok(true)
    }

    /// Rename the file on disk and follow it in the catalog.
    ///
    /// `new_name` may omit the extension, in which case the current one is
    /// kept. A hidden image stays hidden under its new path.
    pub fn rename(&mut self, path: &Path, new_name: &str) -> Result<ImageEntry, CatalogError> {
        let index = self.index_of(path)?;
        let old_path = self.entries[index].path.clone();
        let new_name = target_name(&old_path, new_name)?;
        if new_name == self.entries[index].display_name {
            return Ok(self.entries[index].clone());
        }

        let new_path = old_path.with_file_name(&new_name);
        if fs::symlink_metadata(&new_path).is_ok() {
            log::warn!("File already exists: {}", new_path.display());
            return Err(CatalogError::RenameConflict {
                from: old_path,
                to: new_path,
            });
        }

        log::info!("Renaming {} to {}", self.entries[index].display_name, new_name);
        if let Err(source) = fs::rename(&old_path, &new_path) {
            return Err(CatalogError::RenameIo {
                from: old_path,
                to: new_path,
                source,
            });
        }

        let entry = &mut self.entries[index];
        entry.path = new_path.clone();
        entry.display_name = new_name;
        let renamed = entry.clone();

        if renamed.hidden {
            self.settings.hidden.remove(&old_path);
            self.settings.hidden.insert(new_path);
            self.persist();
        } else if self.settings.hidden.remove(&new_path) {
            // A stale key for a file deleted elsewhere must not hide this one.
            log::debug!("Dropped stale hidden entry {}", new_path.display());
            self.persist();
        }
        Ok(renamed)
    }

    /// Delete the file and forget the entry.
    pub fn remove(&mut self, path: &Path) -> Result<(), CatalogError> {
        let index = self.index_of(path)?;
        let target = self.entries[index].path.clone();
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("{} was already gone", target.display());
            }
            Err(source) => return Err(CatalogError::DeleteIo { path: target, source }),
        }

        let entry = self.entries.remove(index);
        log::info!("Deleted image: {}", entry.display_name);
        if self.settings.hidden.remove(&entry.path) {
            self.persist();
        }
        Ok(())
    }

    /// Copy images into the workspace. Existing files are never overwritten.
    pub fn add<I, P>(&mut self, paths: I) -> AddReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut report = AddReport::default();
        for source in paths {
            let source = source.as_ref();
            match self.add_one(source) {
                Ok(entry) => {
                    log::info!("Copied image: {}", entry.display_name);
                    report.added.push(entry);
                }
                Err(reason) => {
                    log::warn!("Skipping {}: {}", source.display(), reason);
                    report.skipped.push(Skipped {
                        path: source.to_path_buf(),
                        reason,
                    });
                }
            }
        }
        report
    }

    fn add_one(&mut self, source: &Path) -> Result<ImageEntry, SkipReason> {
        if !is_supported_image(source) {
            return Err(SkipReason::Unsupported);
        }
        let file_name = source.file_name().ok_or(SkipReason::Unsupported)?;
        let destination = self.workspace.root().join(file_name);
        if fs::symlink_metadata(&destination).is_ok() {
            return Err(SkipReason::AlreadyExists);
        }

        fs::copy(source, &destination)?;
        if let Err(e) = copy_modified_time(source, &destination) {
            log::debug!("Could not keep modification time of {}: {}", source.display(), e);
        }

        let metadata = fs::metadata(&destination)?;
        let entry = ImageEntry::from_metadata(destination, &metadata, &self.settings.hidden)?;
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Drop hidden paths whose files no longer exist. Returns what was removed.
    pub fn prune_stale(&mut self) -> Vec<PathBuf> {
        let stale: Vec<PathBuf> = self
            .settings
            .hidden
            .iter()
            .filter(|p| fs::symlink_metadata(p).is_err())
            .cloned()
            .collect();
        if !stale.is_empty() {
            for path in &stale {
                self.settings.hidden.remove(path);
            }
            log::info!("Pruned {} stale hidden paths", stale.len());
            self.persist();
        }
        stale
    }

    fn index_of(&self, path: &Path) -> Result<usize, CatalogError> {
        self.entries
            .iter()
            .position(|e| e.path == path)
            .ok_or_else(|| CatalogError::NotFound(path.to_path_buf()))
    }

    fn apply_hidden(&mut self, index: usize, hidden: bool) {
        let entry = &mut self.entries[index];
        entry.hidden = hidden;
        if hidden {
            self.settings.hidden.insert(entry.path.clone());
        } else {
            self.settings.hidden.remove(&entry.path);
        }
        log::info!(
            "Image {}: {}",
            if hidden { "hidden" } else { "shown" },
            entry.display_name
        );
        self.persist();
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.settings) {
            log::warn!("{}; changes are kept in memory only", e);
            self.warnings.push(e);
        }
    }
}

fn target_name(current: &Path, requested: &str) -> Result<String, CatalogError> {
    let requested = requested.trim();
    if requested.is_empty()
        || requested == "."
        || requested == ".."
        || requested.contains(['/', '\\'])
    {
        return Err(CatalogError::InvalidName(requested.to_string()));
    }

    match current.extension().and_then(|e| e.to_str()) {
        Some(ext) => {
            let suffix = format!(".{}", ext);
            if requested.to_lowercase().ends_with(&suffix.to_lowercase()) {
                Ok(requested.to_string())
            } else {
                Ok(format!("{}{}", requested, suffix))
            }
        }
        None => Ok(requested.to_string()),
    }
}

fn copy_modified_time(from: &Path, to: &Path) -> io::Result<()> {
    let modified = fs::metadata(from)?.modified()?;
    fs::File::options().write(true).open(to)?.set_modified(modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn entry(name: &str, size: u64, age_secs: u64) -> ImageEntry {
        ImageEntry {
            path: PathBuf::from("/photos").join(name),
            display_name: name.to_string(),
            size_bytes: size,
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000 - age_secs),
            hidden: false,
        }
    }

    fn names(entries: &[ImageEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.display_name.as_str()).collect()
    }

    fn workspace_with(files: &[(&str, usize)]) -> (TempDir, Workspace) {
        let dir = TempDir::new().unwrap();
        for (name, size) in files {
            fs::write(dir.path().join(name), vec![0u8; *size]).unwrap();
        }
        let workspace = Workspace::open(dir.path()).unwrap();
        (dir, workspace)
    }

    #[test]
    fn supported_extensions_ignore_case() {
        assert!(is_supported_image(Path::new("a.jpg")));
        assert!(is_supported_image(Path::new("a.JPEG")));
        assert!(is_supported_image(Path::new("a.Png")));
        assert!(!is_supported_image(Path::new("a.gif")));
        assert!(!is_supported_image(Path::new("a.tiff")));
        assert!(!is_supported_image(Path::new("jpg")));
    }

    #[test]
    fn scan_lists_only_supported_files_at_top_level() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 3), ("b.PNG", 4), ("notes.txt", 1), ("c.gif", 1)]);
        fs::create_dir(ws.root().join("nested.jpg")).unwrap();
        fs::create_dir(ws.root().join("sub")).unwrap();
        fs::write(ws.root().join("sub").join("deep.jpg"), b"x").unwrap();

        let report = scan(ws.root(), &HiddenSet::new()).unwrap();
        let sorted = sort(report.entries, SortKey::Name);

        assert_eq!(names(&sorted), vec!["a.jpg", "b.PNG"]);
        assert_eq!(sorted[0].size_bytes, 3);
        assert_eq!(sorted[0].path, ws.root().join("a.jpg"));
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn scan_marks_hidden_from_set() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 1), ("b.jpg", 1)]);
        let mut hidden = HiddenSet::new();
        hidden.insert(ws.root().join("b.jpg"));

        let report = scan(ws.root(), &hidden).unwrap();
        for entry in &report.entries {
            assert_eq!(entry.hidden, entry.display_name == "b.jpg");
        }
    }

    #[test]
    fn scan_of_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let result = scan(&dir.path().join("nope"), &HiddenSet::new());
        assert!(matches!(result, Err(CatalogError::Scan { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn scan_reports_unreadable_files() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 1)]);
        std::os::unix::fs::symlink(ws.root().join("gone.jpg"), ws.root().join("broken.jpg")).unwrap();

        let report = scan(ws.root(), &HiddenSet::new()).unwrap();
        assert_eq!(names(&report.entries), vec!["a.jpg"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, ws.root().join("broken.jpg"));
    }

    #[test]
    fn sort_by_size_is_stable_and_descending() {
        let entries = vec![entry("d.jpg", 5, 0), entry("a.jpg", 1, 0), entry("b.jpg", 5, 0), entry("c.jpg", 3, 0)];

        let by_size = sort(entries, SortKey::Size);
        assert_eq!(names(&by_size), vec!["d.jpg", "b.jpg", "c.jpg", "a.jpg"]);

        let by_name = sort(by_size, SortKey::Name);
        assert_eq!(names(&by_name), vec!["a.jpg", "b.jpg", "c.jpg", "d.jpg"]);
    }

    #[test]
    fn sort_by_name_ignores_case_and_keeps_ties() {
        let entries = vec![entry("b.jpg", 1, 0), entry("X.jpg", 2, 0), entry("A.jpg", 3, 0), entry("x.jpg", 4, 0)];
        let sorted = sort(entries, SortKey::Name);
        assert_eq!(names(&sorted), vec!["A.jpg", "b.jpg", "X.jpg", "x.jpg"]);
    }

    #[test]
    fn sort_by_modified_is_newest_first() {
        let entries = vec![entry("old.jpg", 1, 300), entry("new.jpg", 1, 10), entry("mid.jpg", 1, 100)];
        let sorted = sort(entries, SortKey::Modified);
        assert_eq!(names(&sorted), vec!["new.jpg", "mid.jpg", "old.jpg"]);
    }

    #[test]
    fn filter_matches_substring_ignoring_case() {
        let entries = vec![entry("Beach.jpg", 1, 0), entry("city.png", 1, 0), entry("BEACHES.png", 1, 0)];

        assert_eq!(names(&filter(entries.clone(), "beach")), vec!["Beach.jpg", "BEACHES.png"]);
        assert_eq!(names(&filter(entries.clone(), "")), vec!["Beach.jpg", "city.png", "BEACHES.png"]);
        assert!(filter(entries, "forest").is_empty());
    }

    #[test]
    fn sort_key_parses_aliases() {
        assert_eq!("name".parse::<SortKey>(), Ok(SortKey::Name));
        assert_eq!("date modified".parse::<SortKey>(), Ok(SortKey::Modified));
        assert_eq!("Size".parse::<SortKey>(), Ok(SortKey::Size));
        assert!("color".parse::<SortKey>().is_err());
    }

    #[test]
    fn toggle_twice_restores_state() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 1)]);
        let path = ws.root().join("a.jpg");
        let mut catalog = Catalog::open(ws.clone()).unwrap();

        assert!(catalog.toggle_hidden(&path).unwrap());
        assert!(catalog.hidden().contains(&path));
        let persisted = ConfigStore::new(ws.config_path()).load().unwrap();
        assert!(persisted.hidden.contains(&path));

        assert!(!catalog.toggle_hidden(&path).unwrap());
        assert!(catalog.hidden().is_empty());
        assert!(!catalog.get(&path).unwrap().hidden);
        let persisted = ConfigStore::new(ws.config_path()).load().unwrap();
        assert!(persisted.hidden.is_empty());
    }

    #[test]
    fn set_hidden_reports_changes() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 1)]);
        let path = ws.root().join("a.jpg");
        let mut catalog = Catalog::open(ws).unwrap();

        assert!(catalog.set_hidden(&path, true).unwrap());
        assert!(!catalog.set_hidden(&path, true).unwrap());
        assert!(catalog.set_hidden(&path, false).unwrap());
    }

    #[test]
    fn unknown_path_is_not_found() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 1)]);
        let missing = ws.root().join("z.jpg");
        let mut catalog = Catalog::open(ws).unwrap();
        assert!(matches!(catalog.toggle_hidden(&missing), Err(CatalogError::NotFound(_))));
    }

    #[test]
    fn corrupt_config_opens_with_warning() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 1)]);
        fs::write(ws.config_path(), "{{{").unwrap();

        let mut catalog = Catalog::open(ws).unwrap();
        assert!(catalog.hidden().is_empty());
        let warnings = catalog.take_warnings();
        assert!(matches!(warnings.as_slice(), [ConfigError::Corrupt { .. }]));
        assert!(catalog.take_warnings().is_empty());
    }

    #[test]
    fn failed_save_keeps_state_in_memory() {
        let (dir, _) = workspace_with(&[("a.jpg", 1)]);
        let ws = Workspace::with_config(dir.path(), dir.path().join("missing").join(CONFIG_FILE)).unwrap();
        let path = ws.root().join("a.jpg");
        let mut catalog = Catalog::open(ws).unwrap();

        assert!(catalog.toggle_hidden(&path).unwrap());
        assert!(catalog.get(&path).unwrap().hidden);
        let warnings = catalog.take_warnings();
        assert!(matches!(warnings.as_slice(), [ConfigError::Write { .. }]));
    }

    #[test]
    fn rename_appends_extension() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 1)]);
        let mut catalog = Catalog::open(ws.clone()).unwrap();

        let renamed = catalog.rename(&ws.root().join("a.jpg"), "sunrise").unwrap();
        assert_eq!(renamed.display_name, "sunrise.jpg");
        assert_eq!(renamed.path, ws.root().join("sunrise.jpg"));
        assert!(renamed.path.exists());
        assert!(!ws.root().join("a.jpg").exists());
        assert_eq!(catalog.entries().len(), 1);
    }

    #[test]
    fn rename_keeps_hidden_under_new_path() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 1)]);
        let old = ws.root().join("a.jpg");
        let mut catalog = Catalog::open(ws.clone()).unwrap();
        catalog.toggle_hidden(&old).unwrap();

        let renamed = catalog.rename(&old, "b.jpg").unwrap();
        assert!(renamed.hidden);
        assert!(catalog.hidden().contains(&renamed.path));
        assert!(!catalog.hidden().contains(&old));

        let persisted = ConfigStore::new(ws.config_path()).load().unwrap();
        assert_eq!(persisted.hidden.into_iter().collect::<Vec<_>>(), vec![renamed.path]);
    }

    #[test]
    fn rename_onto_stale_hidden_path_stays_visible() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 1), ("b.jpg", 1)]);
        let a = ws.root().join("a.jpg");
        let b = ws.root().join("b.jpg");
        let mut catalog = Catalog::open(ws.clone()).unwrap();
        catalog.toggle_hidden(&b).unwrap();
        fs::remove_file(&b).unwrap();
        catalog.rescan().unwrap();

        let renamed = catalog.rename(&a, "b").unwrap();
        assert_eq!(renamed.path, b);
        assert!(!renamed.hidden);
        assert!(!catalog.hidden().contains(&b));

        let reopened = Catalog::open(ws).unwrap();
        assert!(!reopened.get(&b).unwrap().hidden);
    }

    #[test]
    fn rename_of_missing_file_changes_nothing() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 1)]);
        let a = ws.root().join("a.jpg");
        let mut catalog = Catalog::open(ws).unwrap();
        let before = catalog.get(&a).unwrap().clone();
        fs::remove_file(&a).unwrap();

        let result = catalog.rename(&a, "b");
        assert!(matches!(result, Err(CatalogError::RenameIo { .. })));
        assert_eq!(catalog.get(&a), Some(&before));
        assert!(catalog.find_by_name("b.jpg").is_none());
    }

    #[test]
    fn rename_conflict_changes_nothing() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 1), ("b.jpg", 2)]);
        let a = ws.root().join("a.jpg");
        let mut catalog = Catalog::open(ws.clone()).unwrap();
        let before = catalog.get(&a).unwrap().clone();

        let result = catalog.rename(&a, "b");
        assert!(matches!(result, Err(CatalogError::RenameConflict { .. })));
        assert_eq!(catalog.get(&a), Some(&before));
        assert_eq!(fs::read(&a).unwrap().len(), 1);
        assert_eq!(fs::read(ws.root().join("b.jpg")).unwrap().len(), 2);
    }

    #[test]
    fn rename_rejects_paths() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 1)]);
        let a = ws.root().join("a.jpg");
        let mut catalog = Catalog::open(ws).unwrap();

        assert!(matches!(catalog.rename(&a, "../b"), Err(CatalogError::InvalidName(_))));
        assert!(matches!(catalog.rename(&a, "  "), Err(CatalogError::InvalidName(_))));
        assert!(a.exists());
    }

    #[test]
    fn rename_to_same_name_is_noop() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 1)]);
        let a = ws.root().join("a.jpg");
        let mut catalog = Catalog::open(ws).unwrap();

        let entry = catalog.rename(&a, "a").unwrap();
        assert_eq!(entry.path, a);
        assert!(a.exists());
    }

    #[test]
    fn remove_deletes_file_and_hidden_membership() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 1), ("b.jpg", 1)]);
        let a = ws.root().join("a.jpg");
        let mut catalog = Catalog::open(ws.clone()).unwrap();
        catalog.toggle_hidden(&a).unwrap();

        catalog.remove(&a).unwrap();
        assert!(!a.exists());
        assert!(catalog.get(&a).is_none());
        assert!(catalog.hidden().is_empty());
        assert!(ConfigStore::new(ws.config_path()).load().unwrap().hidden.is_empty());
        assert_eq!(catalog.entries().len(), 1);
    }

    #[test]
    fn failed_remove_keeps_entry_and_hidden_membership() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 1)]);
        let a = ws.root().join("a.jpg");
        let mut catalog = Catalog::open(ws.clone()).unwrap();
        catalog.toggle_hidden(&a).unwrap();

        // remove_file fails on a directory even for root.
        fs::remove_file(&a).unwrap();
        fs::create_dir(&a).unwrap();
        fs::write(a.join("inner.txt"), b"x").unwrap();

        let result = catalog.remove(&a);
        assert!(matches!(result, Err(CatalogError::DeleteIo { .. })));
        assert!(catalog.get(&a).is_some());
        assert!(catalog.hidden().contains(&a));
        assert!(ConfigStore::new(ws.config_path()).load().unwrap().hidden.contains(&a));
    }

    #[test]
    fn add_copies_supported_and_skips_the_rest() {
        let (_dir, ws) = workspace_with(&[("existing.jpg", 1)]);
        let source = TempDir::new().unwrap();
        let new_image = source.path().join("new.png");
        let text = source.path().join("readme.txt");
        let duplicate = source.path().join("existing.jpg");
        fs::write(&new_image, b"png").unwrap();
        fs::write(&text, b"txt").unwrap();
        fs::write(&duplicate, b"other").unwrap();

        let mut catalog = Catalog::open(ws.clone()).unwrap();
        let report = catalog.add([&new_image, &text, &duplicate]);

        assert_eq!(names(&report.added), vec!["new.png"]);
        assert_eq!(report.added[0].path, ws.root().join("new.png"));
        assert_eq!(report.added[0].size_bytes, 3);
        assert_eq!(report.skipped.len(), 2);
        assert!(matches!(report.skipped[0].reason, SkipReason::Unsupported));
        assert!(matches!(report.skipped[1].reason, SkipReason::AlreadyExists));
        assert_eq!(fs::read(ws.root().join("existing.jpg")).unwrap(), vec![0u8]);
        assert_eq!(catalog.entries().len(), 2);
    }

    #[test]
    fn add_keeps_modification_time() {
        let (_dir, ws) = workspace_with(&[]);
        let source = TempDir::new().unwrap();
        let image = source.path().join("old.jpg");
        fs::write(&image, b"jpg").unwrap();
        let past = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        fs::File::options().write(true).open(&image).unwrap().set_modified(past).unwrap();

        let mut catalog = Catalog::open(ws).unwrap();
        let report = catalog.add([&image]);
        assert_eq!(report.added[0].modified, past);
    }

    #[test]
    fn prune_removes_missing_paths() {
        let (_dir, ws) = workspace_with(&[("a.jpg", 1)]);
        let a = ws.root().join("a.jpg");
        let mut catalog = Catalog::open(ws.clone()).unwrap();
        catalog.toggle_hidden(&a).unwrap();
        catalog.toggle_hidden(&a).unwrap();
        catalog.toggle_hidden(&a).unwrap();

        let ghost = ws.root().join("ghost.jpg");
        let mut settings = ConfigStore::new(ws.config_path()).load().unwrap();
        settings.hidden.insert(ghost.clone());
        ConfigStore::new(ws.config_path()).save(&settings).unwrap();

        let mut catalog = Catalog::open(ws.clone()).unwrap();
        assert_eq!(catalog.prune_stale(), vec![ghost]);
        assert_eq!(catalog.hidden().iter().collect::<Vec<_>>(), vec![&a]);
        assert!(catalog.prune_stale().is_empty());
    }

    #[test]
    fn stats_and_visible_paths_follow_hidden_flags() {
        let mut entries = vec![entry("a.jpg", 10, 0), entry("b.jpg", 20, 0), entry("c.jpg", 30, 0)];
        entries[1].hidden = true;

        let stats = summarize(&entries);
        assert_eq!(stats, CatalogStats { total: 3, visible: 2, hidden: 1, total_bytes: 60 });
        assert_eq!(
            visible_paths(&entries),
            vec![PathBuf::from("/photos/a.jpg"), PathBuf::from("/photos/c.jpg")]
        );
    }

    #[test]
    fn output_directory_defaults_to_root() {
        let (_dir, ws) = workspace_with(&[]);
        let mut catalog = Catalog::open(ws.clone()).unwrap();
        assert_eq!(catalog.output_directory(), ws.root());

        catalog.set_output_directory(Some(PathBuf::from("/videos")));
        assert_eq!(catalog.output_directory(), PathBuf::from("/videos"));
        let persisted = ConfigStore::new(ws.config_path()).load().unwrap();
        assert_eq!(persisted.output_directory, Some(PathBuf::from("/videos")));
    }
}
