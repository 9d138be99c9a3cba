use std::{
    path::PathBuf,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use log::{info, warn};
use tokio::sync::Mutex;

use crate::entity::device::DeviceRecord;
use crate::error::InventoryError;
use crate::multipart::FilePart;
use crate::photos::{PhotoStore, photo_filename};

/// Process-lifetime device registry. Records live in memory in insertion
/// order; photo files live in the photo store and are created and removed
/// together with the records that reference them.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Register a device. Fails with `Validation` when `name` is empty;
    /// a failed photo write consumes no id and stores nothing.
    async fn create(
        &self,
        name: &str,
        description: &str,
        photo: Option<&FilePart>,
    ) -> Result<DeviceRecord, InventoryError>;

    /// Snapshot of all records in insertion order.
    async fn list(&self) -> Vec<DeviceRecord>;

    async fn get(&self, id: u64) -> Result<DeviceRecord, InventoryError>;

    /// Partial update: an absent or empty name leaves the existing name
    /// unchanged; a present description, including the empty string,
    /// replaces the existing one.
    async fn update(
        &self,
        id: u64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<DeviceRecord, InventoryError>;

    /// Replace the device's photo. The previous file is removed best-effort
    /// before the new one is written, so the two never coexist on disk.
    async fn update_photo(&self, id: u64, photo: &FilePart)
    -> Result<DeviceRecord, InventoryError>;

    /// Remove the record and its photo file (best-effort). The id is never
    /// reused.
    async fn delete(&self, id: u64) -> Result<(), InventoryError>;

    /// Path of the device's photo file; `NotFound` when the record, its
    /// photo reference, or the file itself is absent.
    async fn photo_path(&self, id: u64) -> Result<PathBuf, InventoryError>;
}

struct StoreInner {
    records: Vec<DeviceRecord>,
    next_id: u64,
}

struct InventoryStoreImpl {
    photos: Arc<dyn PhotoStore>,
    // Single lock over the records and the id counter, held across photo
    // I/O so mutations serialize against each other and against reads.
    inner: Mutex<StoreInner>,
}

impl InventoryStoreImpl {
    fn new(photos: Arc<dyn PhotoStore>) -> Self {
        Self {
            photos,
            inner: Mutex::new(StoreInner {
                records: Vec::new(),
                next_id: 1,
            }),
        }
    }
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[async_trait]
impl InventoryStore for InventoryStoreImpl {
    async fn create(
        &self,
        name: &str,
        description: &str,
        photo: Option<&FilePart>,
    ) -> Result<DeviceRecord, InventoryError> {
        if name.is_empty() {
            return Err(InventoryError::validation("Inventory name is required"));
        }
        let mut inner = self.inner.lock().await;
        let id = inner.next_id;
        let mut record = DeviceRecord {
            id,
            inventory_name: name.to_string(),
            description: description.to_string(),
            photo_filename: None,
            created_at: now_epoch(),
        };
        if let Some(part) = photo {
            let filename = photo_filename(id, &part.filename);
            self.photos.write(&filename, &part.data).await?;
            record.photo_filename = Some(filename);
        }
        inner.next_id += 1;
        inner.records.push(record.clone());
        info!("registered device {id} ({name})");
        Ok(record)
    }

    async fn list(&self) -> Vec<DeviceRecord> {
        self.inner.lock().await.records.clone()
    }

    async fn get(&self, id: u64) -> Result<DeviceRecord, InventoryError> {
        let inner = self.inner.lock().await;
        inner
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(InventoryError::NotFound)
    }

    async fn update(
        &self,
        id: u64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<DeviceRecord, InventoryError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(InventoryError::NotFound)?;
        // An empty name means "leave unchanged"; an empty description is an
        // explicit replacement.
        if let Some(name) = name {
            if !name.is_empty() {
                record.inventory_name = name.to_string();
            }
        }
        if let Some(description) = description {
            record.description = description.to_string();
        }
        Ok(record.clone())
    }

    async fn update_photo(
        &self,
        id: u64,
        photo: &FilePart,
    ) -> Result<DeviceRecord, InventoryError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(InventoryError::NotFound)?;
        if let Some(old) = record.photo_filename.clone() {
            if let Err(e) = self.photos.delete(&old).await {
                warn!("failed to remove old photo {old}: {e:#}");
            }
        }
        let filename = photo_filename(id, &photo.filename);
        self.photos.write(&filename, &photo.data).await?;
        record.photo_filename = Some(filename);
        info!("updated photo for device {id}");
        Ok(record.clone())
    }

    async fn delete(&self, id: u64) -> Result<(), InventoryError> {
        let mut inner = self.inner.lock().await;
        let idx = inner
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or(InventoryError::NotFound)?;
        let record = inner.records.remove(idx);
        if let Some(filename) = record.photo_filename {
            if let Err(e) = self.photos.delete(&filename).await {
                warn!("failed to remove photo {filename}: {e:#}");
            }
        }
        info!("deleted device {id}");
        Ok(())
    }

    async fn photo_path(&self, id: u64) -> Result<PathBuf, InventoryError> {
        let inner = self.inner.lock().await;
        let record = inner
            .records
            .iter()
            .find(|r| r.id == id)
            .ok_or(InventoryError::NotFound)?;
        let filename = record
            .photo_filename
            .as_deref()
            .ok_or(InventoryError::NotFound)?;
        if !self.photos.exists(filename).await {
            return Err(InventoryError::NotFound);
        }
        Ok(self.photos.resolve_path(filename)?)
    }
}

/// Create a new in-memory inventory store. The concrete type is hidden;
/// callers only see the trait.
pub fn new_inventory_store(photos: Arc<dyn PhotoStore>) -> impl InventoryStore {
    InventoryStoreImpl::new(photos)
}
