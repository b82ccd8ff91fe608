use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use crate::encoding::encode_chunked;
use crate::error::{PortalError, Result};
use crate::slots::{ReconcileOutcome, SlotTable, SlotView};

use super::api_client::MaterialsBackend;
use super::fallback::TableQuery;
use super::lock::UiLock;
use super::notify::{Confirm, Notice, Notifier};
use super::reload_queue::{QueuePolicy, ReloadFn, ReloadQueue, ReloadRequest};
use super::types::*;

pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelSettings {
    pub queue: QueuePolicy,
    /// Abort the list endpoint after this long and use the fallback.
    pub list_timeout: Duration,
    /// Settle delays before the reload that follows each action.
    pub slot_reload_delay: Duration,
    pub batch_reload_delay: Duration,
    pub delete_reload_delay: Duration,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            queue: QueuePolicy::default(),
            list_timeout: DEFAULT_LIST_TIMEOUT,
            slot_reload_delay: Duration::from_millis(800),
            batch_reload_delay: Duration::from_millis(500),
            delete_reload_delay: Duration::from_millis(500),
        }
    }
}

/// The course whose materials are shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub programme: String,
    pub level: String,
    pub course: String,
}

impl Selection {
    pub fn new(programme: &str, level: &str, course: &str) -> Self {
        Self {
            programme: programme.to_string(),
            level: level.to_string(),
            course: course.to_string(),
        }
    }

    pub fn filter(&self) -> CourseFilter {
        CourseFilter::new(&self.programme, &self.level, &self.course)
    }
}

/// Owns the slot table, UI lock and reload queue for one materials view, and
/// implements the user actions against the backend.
pub struct MaterialsPanel {
    backend: Arc<dyn MaterialsBackend>,
    fallback: Option<Arc<dyn TableQuery>>,
    notifier: Arc<dyn Notifier>,
    settings: PanelSettings,
    lock: UiLock,
    queue: Arc<ReloadQueue>,
    slots: Mutex<SlotTable>,
    selection: Mutex<Option<Selection>>,
    in_flight: Mutex<HashSet<String>>,
}

/// Marks a filter as loading until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    key: String,
}

impl<'a> InFlight<'a> {
    fn enter(set: &'a Mutex<HashSet<String>>, key: String) -> Option<Self> {
        let inserted = lock_or_recover(set).insert(key.clone());
        inserted.then(|| Self { set, key })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock_or_recover(self.set).remove(&self.key);
    }
}

fn lock_or_recover<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MaterialsPanel {
    pub fn new(
        backend: Arc<dyn MaterialsBackend>,
        fallback: Option<Arc<dyn TableQuery>>,
        notifier: Arc<dyn Notifier>,
        settings: PanelSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let lock = UiLock::new();
            let weak = weak.clone();
            let reload: ReloadFn = Arc::new(move |req: ReloadRequest| {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(panel) => panel.load_materials(req.filter()).await.map(|_| ()),
                        None => Ok(()),
                    }
                }
                .boxed()
            });
            Self {
                backend,
                fallback,
                notifier,
                settings,
                queue: ReloadQueue::new(settings.queue, lock.clone(), reload),
                lock,
                slots: Mutex::new(SlotTable::new()),
                selection: Mutex::new(None),
                in_flight: Mutex::new(HashSet::new()),
            }
        })
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn settings(&self) -> PanelSettings {
        self.settings
    }

    pub fn lock(&self) -> &UiLock {
        &self.lock
    }

    pub fn queue(&self) -> &Arc<ReloadQueue> {
        &self.queue
    }

    pub fn selection(&self) -> Option<Selection> {
        lock_or_recover(&self.selection).clone()
    }

    pub fn slot_views(&self) -> Vec<SlotView> {
        self.slots().views()
    }

    pub fn slot_view(&self, index: usize) -> Result<SlotView> {
        self.slots().view(index)
    }

    pub fn slot_material(&self, index: usize) -> Option<Material> {
        self.slots().material(index).cloned()
    }

    fn slots(&self) -> MutexGuard<'_, SlotTable> {
        lock_or_recover(&self.slots)
    }

    fn fail<T>(&self, err: PortalError) -> Result<T> {
        self.notifier.notify(Notice::error(err.to_string()));
        Err(err)
    }

    fn require_selection(&self) -> Result<Selection> {
        match self.selection() {
            Some(sel) => Ok(sel),
            None => self.fail(PortalError::NoCourseSelected),
        }
    }

    fn require_material(&self, index: usize) -> Result<Material> {
        if let Err(e) = SlotTable::check_index(index) {
            return self.fail(e);
        }
        match self.slot_material(index) {
            Some(m) => Ok(m),
            None => self.fail(PortalError::EmptySlot(index)),
        }
    }

    // ── Selection & loading ─────────────────────────────────────────────

    /// Show a course and queue a load of its materials. An empty course
    /// clears the selection and every slot.
    pub fn select_course(&self, programme: &str, level: &str, course: &str) -> Option<u64> {
        if course.is_empty() {
            self.clear_selection();
            return None;
        }
        *lock_or_recover(&self.selection) = Some(Selection::new(programme, level, course));
        log::info!("Course selected: {}. Loading materials via queue...", course);
        Some(self.queue.enqueue(programme, level, course))
    }

    pub fn clear_selection(&self) {
        *lock_or_recover(&self.selection) = None;
        self.slots().reset();
    }

    /// Fetch the materials for `filter` and replace the slot table.
    ///
    /// Returns `Ok(None)` when an identical load is already running.
    pub async fn load_materials(&self, filter: CourseFilter) -> Result<Option<ReconcileOutcome>> {
        let Some(_flight) = InFlight::enter(&self.in_flight, filter.signature()) else {
            log::warn!(
                "load_materials already in progress for {}, skipping",
                filter.signature()
            );
            return Ok(None);
        };

        match self.fetch_materials(&filter).await {
            Ok(materials) => {
                log::info!("Received {} materials", materials.len());
                Ok(Some(self.slots().reconcile(materials)))
            }
            Err(e) => {
                self.notifier
                    .notify(Notice::error(format!("Error loading materials: {}", e)));
                Err(e)
            }
        }
    }

    /// List endpoint with a timeout; the table fallback runs once when it
    /// fails, times out or comes back empty.
    async fn fetch_materials(&self, filter: &CourseFilter) -> Result<Vec<Material>> {
        let timeout = self.settings.list_timeout;
        let primary =
            tokio::time::timeout(timeout, self.backend.list_materials(filter.clone())).await;

        let primary_err = match primary {
            Ok(Ok(materials)) if !materials.is_empty() => return Ok(materials),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                log::warn!("Materials endpoint failed, trying direct table query: {}", e);
                Some(e)
            }
            Err(_) => {
                log::warn!(
                    "Materials endpoint timed out after {:?}, trying direct table query",
                    timeout
                );
                Some(PortalError::Timeout(timeout))
            }
        };

        match &self.fallback {
            Some(fallback) => fallback.select_materials(filter.clone()).await,
            None => match primary_err {
                Some(e) => Err(e),
                None => Ok(Vec::new()),
            },
        }
    }

    fn schedule_reload(&self, selection: Selection, delay: Duration) {
        let queue = Arc::clone(&self.queue);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.enqueue(&selection.programme, &selection.level, &selection.course);
            log::debug!("Materials reload queued for {}", selection.course);
        });
    }

    // ── Uploads ─────────────────────────────────────────────────────────

    fn upload_request(selection: &Selection, file: &FileUpload) -> Result<UploadRequest> {
        Ok(UploadRequest {
            file_base64: encode_chunked(&file.bytes)?,
            filename: file.filename.clone(),
            programme: selection.programme.clone(),
            level: selection.level.clone(),
            course: selection.course.clone(),
            title: file.filename.clone(),
        })
    }

    /// Upload one file into an empty slot, then queue a reload of the course.
    pub async fn upload_to_slot(&self, slot: usize, file: FileUpload) -> Result<()> {
        if let Err(e) = SlotTable::check_index(slot) {
            return self.fail(e);
        }
        if file.filename.is_empty() {
            return self.fail(PortalError::MissingInput(format!(
                "Please select a file for Material {}",
                slot
            )));
        }
        let selection = self.require_selection()?;
        if self.slot_material(slot).is_some() {
            return self.fail(PortalError::SlotOccupied(slot));
        }

        log::info!(
            "Uploading material for slot {}: {} ({} bytes) to {}/{}/{}",
            slot,
            file.filename,
            file.bytes.len(),
            selection.programme,
            selection.level,
            selection.course
        );

        let result = self
            .lock
            .run_exclusive(async {
                let req = Self::upload_request(&selection, &file)?;
                self.backend.upload_material(req).await
            })
            .await;

        match result {
            Ok(reply) if reply.success => {
                self.notifier
                    .notify(Notice::success(format!("Material {} uploaded successfully", slot)));
                self.schedule_reload(selection, self.settings.slot_reload_delay);
                Ok(())
            }
            Ok(reply) => {
                let message = reply.message_or_unknown();
                self.notifier
                    .notify(Notice::error(format!("Upload failed: {}", message)));
                Err(PortalError::Rejected(message))
            }
            Err(e) => {
                self.notifier
                    .notify(Notice::error(format!("Upload error: {}", e)));
                Err(e)
            }
        }
    }

    /// Upload several files in order, stopping at the first failure. On
    /// success the slots are reset and a reload is queued.
    pub async fn upload_batch(&self, files: Vec<FileUpload>) -> Result<usize> {
        let selection = self.require_selection()?;
        if files.is_empty() {
            return self.fail(PortalError::MissingInput(
                "Please select at least one file to upload".to_string(),
            ));
        }
        if let Some(pos) = files.iter().position(|f| f.filename.is_empty()) {
            return self.fail(PortalError::MissingInput(format!(
                "File {} has no name",
                pos + 1
            )));
        }

        let result = self
            .lock
            .run_exclusive(async {
                for file in &files {
                    let req = Self::upload_request(&selection, file)?;
                    let reply = self.backend.upload_material(req).await?;
                    if !reply.success {
                        return Ok(Some((file.filename.clone(), reply.message_or_unknown())));
                    }
                }
                Ok::<_, PortalError>(None)
            })
            .await;

        match result {
            Ok(None) => {
                self.notifier.notify(Notice::success(format!(
                    "Successfully uploaded {} file(s) to course {}",
                    files.len(),
                    selection.course
                )));
                self.slots().reset();
                self.schedule_reload(selection, self.settings.batch_reload_delay);
                Ok(files.len())
            }
            Ok(Some((filename, message))) => {
                self.notifier.notify(Notice::error(format!(
                    "Upload failed for {}: {}",
                    filename, message
                )));
                Err(PortalError::Rejected(message))
            }
            Err(e) => {
                self.notifier
                    .notify(Notice::error(format!("Upload failed: {}", e)));
                Err(e)
            }
        }
    }

    // ── Slot actions ────────────────────────────────────────────────────

    /// Delete the material in `slot` after confirmation. The slot is emptied
    /// right away and a reload of the current course is queued.
    pub async fn delete_slot(&self, slot: usize, confirm: &dyn Confirm) -> Result<Material> {
        let material = self.require_material(slot)?;
        let name = material
            .filename
            .clone()
            .or_else(|| material.material_name.clone())
            .unwrap_or_else(|| "file".to_string());

        if !confirm.confirm(&format!("Delete material {}? This cannot be undone.", name)) {
            log::info!("Delete of slot {} cancelled", slot);
            return Err(PortalError::Cancelled);
        }

        let result = self
            .lock
            .run_exclusive(self.backend.delete_material(material.storage_path.clone()))
            .await;

        match result {
            Ok(reply) if reply.success => {
                self.notifier
                    .notify(Notice::success(format!("Material {} deleted successfully", name)));
                self.slots().mark_deleted(slot)?;
                if let Some(selection) = self.selection() {
                    self.schedule_reload(selection, self.settings.delete_reload_delay);
                }
                Ok(material)
            }
            Ok(reply) => {
                let message = reply.message_or_unknown();
                self.notifier
                    .notify(Notice::error(format!("Delete failed: {}", message)));
                Err(PortalError::Rejected(message))
            }
            Err(e) => {
                self.notifier
                    .notify(Notice::error(format!("Delete error: {}", e)));
                Err(e)
            }
        }
    }

    async fn signed_url_for(&self, material: &Material) -> Result<String> {
        let reply = self
            .backend
            .signed_view_url(material.storage_path.clone())
            .await?;
        match (reply.success, reply.signed_url) {
            (true, Some(url)) if !url.is_empty() => Ok(url),
            _ => Err(PortalError::Rejected(format!(
                "Failed to get signed URL: {}",
                reply
                    .message
                    .unwrap_or_else(|| "Unknown error".to_string())
            ))),
        }
    }

    /// Short-lived URL for viewing the material in `slot`.
    pub async fn view_slot(&self, slot: usize) -> Result<String> {
        let material = self.require_material(slot)?;
        match self.signed_url_for(&material).await {
            Ok(url) => Ok(url),
            Err(e) => {
                self.notifier
                    .notify(Notice::error(format!("Error viewing material: {}", e)));
                Err(e)
            }
        }
    }

    /// Save the material in `slot` into `dir`, named after its filename.
    pub async fn download_slot(&self, slot: usize, dir: &Path) -> Result<PathBuf> {
        let material = self.require_material(slot)?;
        let result = async {
            let url = self.signed_url_for(&material).await?;
            let bytes = self.backend.fetch_bytes(url).await?;
            let name = Path::new(material.download_name())
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "download".into());
            let path = dir.join(name);
            tokio::fs::write(&path, &bytes).await?;
            Ok::<_, PortalError>(path)
        }
        .await;

        match result {
            Ok(path) => {
                log::info!("Downloaded slot {} to {}", slot, path.display());
                Ok(path)
            }
            Err(e) => {
                self.notifier
                    .notify(Notice::error(format!("Error downloading material: {}", e)));
                Err(e)
            }
        }
    }

    // ── Courses ─────────────────────────────────────────────────────────

    pub async fn list_courses(&self, programme: &str, level: &str) -> Result<Vec<Course>> {
        if programme.is_empty() || level.is_empty() {
            return self.fail(PortalError::MissingInput(
                "Please select programme and level".to_string(),
            ));
        }
        log::info!("Fetching courses for {} Level {}...", programme, level);
        match self
            .backend
            .list_courses(programme.to_string(), level.to_string())
            .await
        {
            Ok(courses) => {
                log::info!("{} course(s) loaded", courses.len());
                Ok(courses)
            }
            Err(e) => {
                self.notifier
                    .notify(Notice::error(format!("Error loading courses: {}", e)));
                Err(e)
            }
        }
    }
}
