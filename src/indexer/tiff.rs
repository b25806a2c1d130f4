use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use super::{legacy_page_index, plane_index, PlaneCounts};
use crate::axes::{DimensionOrder, PlaneKey, Selection};
use crate::error::IndexError;
use crate::format::tiff::{PageSource, TiffPage};

// =============================================================================
// Legacy pyramid
// =============================================================================

/// Pyramid stored as consecutive runs of planes in the main IFD chain:
/// all planes of level 0, then all planes of level 1, and so on.
pub struct LegacyIndexer {
    pages: Arc<dyn PageSource>,
    order: DimensionOrder,
    counts: PlaneCounts,
}

impl LegacyIndexer {
    pub fn new(pages: Arc<dyn PageSource>, order: DimensionOrder, counts: PlaneCounts) -> Self {
        Self {
            pages,
            order,
            counts,
        }
    }

    pub fn page_index(&self, key: PlaneKey, level: usize) -> usize {
        legacy_page_index(self.order, key, self.counts, level)
    }

    pub async fn index(&self, key: PlaneKey, level: usize) -> Result<Arc<TiffPage>, IndexError> {
        let index = self.page_index(key, level);
        Ok(self.pages.page(index).await?)
    }
}

// =============================================================================
// SubIFD pyramid
// =============================================================================

/// Pyramid stored as SubIFD pointers: the main chain holds full-resolution
/// planes, and each plane's SubIFDs tag lists its reduced resolutions.
///
/// Reduced-resolution pages are remembered per `(t, c, z, level)`. Two
/// requests racing on the same key may both parse it; the first insert wins.
pub struct SubIfdIndexer {
    pages: Arc<dyn PageSource>,
    order: DimensionOrder,
    counts: PlaneCounts,
    /// Planes belonging to images that precede this one in the file
    plane_offset: usize,
    resolved: Mutex<HashMap<(PlaneKey, usize), Arc<TiffPage>>>,
}

impl SubIfdIndexer {
    pub fn new(pages: Arc<dyn PageSource>, order: DimensionOrder, counts: PlaneCounts) -> Self {
        Self {
            pages,
            order,
            counts,
            plane_offset: 0,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Index image planes after `plane_offset` planes of earlier images.
    pub fn with_plane_offset(mut self, plane_offset: usize) -> Self {
        self.plane_offset = plane_offset;
        self
    }

    pub fn page_index(&self, key: PlaneKey) -> usize {
        self.plane_offset + plane_index(self.order, key, self.counts)
    }

    pub async fn index(&self, key: PlaneKey, level: usize) -> Result<Arc<TiffPage>, IndexError> {
        let page_index = self.page_index(key);
        if level == 0 {
            return Ok(self.pages.page(page_index).await?);
        }

        if let Some(page) = self.resolved().get(&(key, level)) {
            trace!(%key, level, "SubIFD location cached");
            return Ok(page.clone());
        }

        let base = self.pages.page(page_index).await?;
        let offset = *base
            .sub_ifds
            .get(level - 1)
            .ok_or(IndexError::MissingSubresolution {
                page: page_index,
                level,
            })?;
        let page = self.pages.page_at(offset).await?;

        Ok(self
            .resolved()
            .entry((key, level))
            .or_insert(page)
            .clone())
    }

    /// Number of remembered reduced-resolution pages.
    pub fn resolved_count(&self) -> usize {
        self.resolved().len()
    }

    fn resolved(&self) -> MutexGuard<'_, HashMap<(PlaneKey, usize), Arc<TiffPage>>> {
        self.resolved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Multi-file
// =============================================================================

/// One single-plane TIFF per `(t, c, z)`.
pub struct MultiFileIndexer {
    files: HashMap<PlaneKey, Arc<dyn PageSource>>,
    width: u32,
    height: u32,
}

impl MultiFileIndexer {
    /// Check that every plane of `counts` has a file and that all files share
    /// one resolution. Reads the first page of every file.
    pub async fn open(
        files: Vec<(PlaneKey, Arc<dyn PageSource>)>,
        counts: PlaneCounts,
    ) -> Result<Self, IndexError> {
        let files: HashMap<_, _> = files.into_iter().collect();

        if let Some(missing) = counts.keys().find(|key| !files.contains_key(key)) {
            return Err(IndexError::IncompleteStack {
                key: missing.to_string(),
            });
        }

        let mut entries: Vec<_> = files.iter().collect();
        entries.sort_by_key(|(key, _)| **key);

        let mut resolution: Option<(u32, u32)> = None;
        for (key, file) in entries {
            let page = file.page(0).await?;
            match resolution {
                None => resolution = Some((page.width, page.height)),
                Some((width, height)) if (width, height) != (page.width, page.height) => {
                    return Err(IndexError::AssertSameResolution {
                        key: key.to_string(),
                        expected_width: width,
                        expected_height: height,
                        width: page.width,
                        height: page.height,
                    });
                }
                Some(_) => {}
            }
        }

        let (width, height) = resolution.ok_or(IndexError::IncompleteStack {
            key: PlaneKey::default().to_string(),
        })?;
        debug!(files = files.len(), width, height, "multi-file image indexed");

        Ok(Self {
            files,
            width,
            height,
        })
    }

    /// Shared full-resolution size of every file.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn file(&self, key: PlaneKey) -> Option<&Arc<dyn PageSource>> {
        self.files.get(&key)
    }

    /// Level 0 is each file's first page; deeper levels follow its SubIFDs.
    pub async fn index(&self, key: PlaneKey, level: usize) -> Result<Arc<TiffPage>, IndexError> {
        let file = self.file(key).ok_or_else(|| IndexError::NoImageForSelection {
            key: key.to_string(),
        })?;
        let page = file.page(0).await?;
        if level == 0 {
            return Ok(page);
        }
        let offset = *page
            .sub_ifds
            .get(level - 1)
            .ok_or(IndexError::MissingSubresolution { page: 0, level })?;
        Ok(file.page_at(offset).await?)
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Locates the page holding a plane of a TIFF-family image. Chosen once when
/// the image is opened and shared by the sources of every level.
pub enum PlaneIndexer {
    Legacy(LegacyIndexer),
    SubIfd(SubIfdIndexer),
    MultiFile(MultiFileIndexer),
}

impl PlaneIndexer {
    pub async fn index(
        &self,
        selection: &Selection,
        level: usize,
    ) -> Result<Arc<TiffPage>, IndexError> {
        let key = selection.plane_key();
        match self {
            PlaneIndexer::Legacy(indexer) => indexer.index(key, level).await,
            PlaneIndexer::SubIfd(indexer) => indexer.index(key, level).await,
            PlaneIndexer::MultiFile(indexer) => indexer.index(key, level).await,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PlaneIndexer::Legacy(_) => "legacy",
            PlaneIndexer::SubIfd(_) => "subifd",
            PlaneIndexer::MultiFile(_) => "multi-file",
        }
    }
}

impl std::fmt::Debug for PlaneIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PlaneIndexer").field(&self.kind()).finish()
    }
}
