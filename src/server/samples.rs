//! Sample CRUD endpoints backed by an in-memory store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::server::AppState;
use crate::{Error, Result};

const MAX_NAME_LEN: usize = 10;
const MAX_DESCRIPTION_LEN: usize = 100;

/// A sample item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// Item id
    pub id: u64,
    /// Item name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
}

/// Payload for creating a sample
#[derive(Debug, Clone, Deserialize)]
pub struct SampleCreate {
    /// Item name, at most 10 characters
    pub name: String,
    /// Optional description, at most 100 characters
    pub description: Option<String>,
}

/// Payload for updating a sample; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SampleUpdate {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
}

/// In-memory sample store, shared across requests
pub struct SampleStore {
    items: RwLock<BTreeMap<u64, Sample>>,
    next_id: AtomicU64,
}

impl SampleStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// All items, ordered by id
    #[must_use]
    pub fn all(&self) -> Vec<Sample> {
        self.items.read().values().cloned().collect()
    }

    /// Look up an item by id
    #[must_use]
    pub fn get(&self, id: u64) -> Option<Sample> {
        self.items.read().get(&id).cloned()
    }

    /// Insert a new item
    pub fn create(&self, create: SampleCreate) -> Result<Sample> {
        validate_name(&create.name)?;
        validate_description(create.description.as_deref())?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sample = Sample {
            id,
            name: create.name,
            description: create.description,
        };
        self.items.write().insert(id, sample.clone());
        Ok(sample)
    }

    /// Apply a partial update to an existing item
    pub fn update(&self, id: u64, update: SampleUpdate) -> Result<Sample> {
        if let Some(ref name) = update.name {
            validate_name(name)?;
        }
        validate_description(update.description.as_deref())?;

        let mut items = self.items.write();
        let sample = items
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound("Item not found".to_string()))?;

        if let Some(name) = update.name {
            sample.name = name;
        }
        if let Some(description) = update.description {
            sample.description = Some(description);
        }
        Ok(sample.clone())
    }

    /// Remove an item by id
    pub fn delete(&self, id: u64) -> Result<()> {
        self.items
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound("Item not found".to_string()))
    }
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<()> {
    if let Some(d) = description {
        if d.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(Error::Validation(format!(
                "description must be at most {MAX_DESCRIPTION_LEN} characters"
            )));
        }
    }
    Ok(())
}

pub(super) async fn list(State(state): State<AppState>) -> Json<Vec<Sample>> {
    Json(state.samples.all())
}

pub(super) async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Sample>> {
    state
        .samples
        .get(id)
        .map(Json)
        .ok_or_else(|| Error::NotFound("Item not found".to_string()))
}

pub(super) async fn create(
    State(state): State<AppState>,
    Json(payload): Json<SampleCreate>,
) -> Result<Json<Sample>> {
    state.samples.create(payload).map(Json)
}

pub(super) async fn update(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(payload): Json<SampleUpdate>,
) -> Result<Json<Sample>> {
    state.samples.update(id, payload).map(Json)
}

pub(super) async fn remove(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode> {
    state.samples.delete(id)?;
    Ok(StatusCode::NO_CONTENT)
}
