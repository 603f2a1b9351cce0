use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::document::{OutputFormat, StructuredDocument};
use crate::error::MinerError;
use crate::source::SourceUrl;

const FILE_PREFIX: &str = "content_";
const MAX_STEM_BYTES: usize = 200;

/// A persisted document found in the data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub name: String,
    pub path: PathBuf,
    pub format: OutputFormat,
}

/// Filesystem store keyed by URL. A document's presence at its derived path,
/// in any output format, is the only record that the URL was processed.
pub struct ContentStore {
    root: PathBuf,
    format: OutputFormat,
    claims: Mutex<HashSet<PathBuf>>,
}

/// Exclusive, in-process hold on one URL's path; released on drop.
pub struct ClaimGuard<'a> {
    store: &'a ContentStore,
    path: PathBuf,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.store
            .claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            root: root.into(),
            format,
            claims: Mutex::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn path_for(&self, url: &SourceUrl) -> PathBuf {
        self.root.join(file_name_for(url, self.format))
    }

    /// Path of the URL's document if one is stored, whatever its format.
    pub fn stored_path(&self, url: &SourceUrl) -> Option<PathBuf> {
        OutputFormat::ALL
            .into_iter()
            .map(|format| self.root.join(file_name_for(url, format)))
            .find(|path| path.exists())
    }

    pub fn exists(&self, url: &SourceUrl) -> bool {
        self.stored_path(url).is_some()
    }

    /// Claim `url` for processing. `None` when another worker holds it.
    pub fn claim(&self, url: &SourceUrl) -> Option<ClaimGuard<'_>> {
        let path = self.root.join(file_stem_for(url));
        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
        if !claims.insert(path.clone()) {
            return None;
        }
        Some(ClaimGuard { store: self, path })
    }

    /// Write `doc` to the URL's path. The file is staged next to its target
    /// and published with a no-clobber rename: readers see a complete
    /// document or nothing, and an existing document is never replaced.
    pub fn save(&self, doc: &StructuredDocument, url: &SourceUrl) -> Result<PathBuf, MinerError> {
        let path = self.path_for(url);
        let persist_err = |source: io::Error| MinerError::Persist {
            path: path.clone(),
            source,
        };

        if let Some(existing) = self.stored_path(url) {
            return Err(MinerError::Persist {
                path: existing.clone(),
                source: io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("already stored as {}", existing.display()),
                ),
            });
        }

        let body = doc
            .serialize()
            .map_err(|e| persist_err(io::Error::other(e.to_string())))?;

        fs::create_dir_all(&self.root).map_err(persist_err)?;
        let mut staged = NamedTempFile::new_in(&self.root).map_err(persist_err)?;
        staged.write_all(body.as_bytes()).map_err(persist_err)?;
        staged.as_file().sync_all().map_err(persist_err)?;
        staged
            .persist_noclobber(&path)
            .map_err(|e| persist_err(e.error))?;

        debug!(path = %path.display(), bytes = body.len(), "Document saved");
        Ok(path)
    }

    /// Every persisted document, sorted by file name. A missing data root is
    /// an empty corpus.
    pub fn documents(&self) -> io::Result<Vec<StoredDocument>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut docs = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(FILE_PREFIX) {
                continue;
            }
            let Some(format) = Path::new(&name)
                .extension()
                .and_then(|e| e.to_str())
                .and_then(OutputFormat::from_extension)
            else {
                continue;
            };
            docs.push(StoredDocument {
                path: entry.path(),
                name,
                format,
            });
        }
        docs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(docs)
    }
}

/// `content_<url without scheme, '/' → '_'>.<ext>`. Pure: the same URL always
/// maps to the same name, which is what makes re-runs resumable.
pub fn file_name_for(url: &SourceUrl, format: OutputFormat) -> String {
    format!("{}.{}", file_stem_for(url), format.extension())
}

fn file_stem_for(url: &SourceUrl) -> String {
    let stem = url.without_scheme().replace('/', "_");
    let stem = if stem.len() > MAX_STEM_BYTES {
        shorten(&stem)
    } else {
        stem
    };
    format!("{}{}", FILE_PREFIX, stem)
}

fn shorten(stem: &str) -> String {
    let digest = Sha256::digest(stem.as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    let mut cut = MAX_STEM_BYTES;
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}-{}", &stem[..cut], hex)
}
