//! History sink: the last N saved analyses, persisted as one JSON document.

use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::HistoryItem;
use crate::storage;

pub mod handlers;

pub const DEFAULT_CAPACITY: usize = 50;

pub struct HistoryStore {
    path: Option<PathBuf>,
    capacity: usize,
    /// `None` until the first access loads the file.
    items: Mutex<Option<Vec<HistoryItem>>>,
}

impl HistoryStore {
    pub fn new(path: PathBuf, capacity: usize) -> Self {
        Self {
            path: Some(path),
            capacity: capacity.max(1),
            items: Mutex::new(None),
        }
    }

    pub fn ephemeral(capacity: usize) -> Self {
        Self {
            path: None,
            capacity: capacity.max(1),
            items: Mutex::new(Some(Vec::new())),
        }
    }

    /// Inserts or replaces `item` by id, then drops the oldest entries beyond
    /// capacity. Returns how many entries were evicted. Memory is only
    /// updated once the file write succeeds.
    pub async fn save(&self, item: HistoryItem) -> anyhow::Result<usize> {
        let mut guard = self.items.lock().await;
        let items = self.loaded(&mut guard).await?;

        let mut next: Vec<HistoryItem> = items
            .iter()
            .filter(|existing| existing.id != item.id)
            .cloned()
            .collect();
        next.push(item);
        next.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let evicted = next.len().saturating_sub(self.capacity);
        next.truncate(self.capacity);

        self.persist(&next).await?;
        *items = next;
        if evicted > 0 {
            debug!(evicted, "Evicted oldest history entries");
        }
        Ok(evicted)
    }

    /// Newest first.
    pub async fn list(&self) -> anyhow::Result<Vec<HistoryItem>> {
        let mut guard = self.items.lock().await;
        Ok(self.loaded(&mut guard).await?.clone())
    }

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Option<HistoryItem>> {
        let mut guard = self.items.lock().await;
        let items = self.loaded(&mut guard).await?;
        Ok(items.iter().find(|item| item.id == id).cloned())
    }

    pub async fn remove(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut guard = self.items.lock().await;
        let items = self.loaded(&mut guard).await?;
        if !items.iter().any(|item| item.id == id) {
            return Ok(false);
        }

        let next: Vec<HistoryItem> = items.iter().filter(|item| item.id != id).cloned().collect();
        self.persist(&next).await?;
        *items = next;
        Ok(true)
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        let mut guard = self.items.lock().await;
        let items = self.loaded(&mut guard).await?;
        self.persist(&[]).await?;
        items.clear();
        info!("Cleared analysis history");
        Ok(())
    }

    async fn loaded<'a>(
        &self,
        slot: &'a mut Option<Vec<HistoryItem>>,
    ) -> anyhow::Result<&'a mut Vec<HistoryItem>> {
        if slot.is_none() {
            let mut items: Vec<HistoryItem> = match &self.path {
                Some(path) => storage::read_json(path).await?.unwrap_or_default(),
                None => Vec::new(),
            };
            items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            info!(count = items.len(), "Loaded analysis history");
            *slot = Some(items);
        }
        Ok(slot.get_or_insert_with(Vec::new))
    }

    async fn persist(&self, items: &[HistoryItem]) -> anyhow::Result<()> {
        match &self.path {
            Some(path) => storage::write_json_atomic(path, &items).await,
            None => Ok(()),
        }
    }
}
