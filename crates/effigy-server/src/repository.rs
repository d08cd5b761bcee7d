//! In-memory imposter repository.
//!
//! The repository owns every `ImposterRecord`. Mutations are atomic
//! read-modify-writes of a single record's slot and return the new snapshot;
//! reads return a consistent copy of one record.

use crate::error::{Error, Result};
use crate::imposter::types::{ImposterConfig, ImposterRecord, Stub};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct ImposterRepository {
    records: RwLock<HashMap<String, ImposterRecord>>,
}

impl ImposterRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record with an empty stub list.
    pub fn create(&self, config: ImposterConfig) -> ImposterRecord {
        let record = ImposterRecord {
            config,
            stubs: Vec::new(),
        };
        self.records
            .write()
            .insert(record.config.id.clone(), record.clone());
        record
    }

    pub fn get(&self, id: &str) -> Result<ImposterRecord> {
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ImposterNotFound(id.to_string()))
    }

    /// All records, oldest first.
    pub fn get_all(&self) -> Vec<ImposterRecord> {
        let mut records: Vec<ImposterRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| {
            a.config
                .created_at
                .cmp(&b.config.created_at)
                .then_with(|| a.config.id.cmp(&b.config.id))
        });
        records
    }

    pub fn count(&self) -> usize {
        self.records.read().len()
    }

    /// Apply `f` to the record under the store's critical section and return
    /// the updated snapshot.
    pub fn update<F>(&self, id: &str, f: F) -> Result<ImposterRecord>
    where
        F: FnOnce(&mut ImposterRecord),
    {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| Error::ImposterNotFound(id.to_string()))?;
        f(record);
        Ok(record.clone())
    }

    pub fn remove(&self, id: &str) -> Result<ImposterRecord> {
        self.records
            .write()
            .remove(id)
            .ok_or_else(|| Error::ImposterNotFound(id.to_string()))
    }

    /// Append a stub. Stub ids must be unique within the imposter.
    pub fn add_stub(&self, id: &str, stub: Stub) -> Result<Stub> {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| Error::ImposterNotFound(id.to_string()))?;
        if record.stubs.iter().any(|s| s.id == stub.id) {
            return Err(Error::ServiceError(format!(
                "duplicate stub id {} on imposter {id}",
                stub.id
            )));
        }
        record.stubs.push(stub.clone());
        Ok(stub)
    }

    pub fn get_stubs(&self, id: &str) -> Result<Vec<Stub>> {
        self.get(id).map(|record| record.stubs)
    }

    pub fn update_stub<F>(&self, id: &str, stub_id: &str, f: F) -> Result<Stub>
    where
        F: FnOnce(&mut Stub),
    {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| Error::ImposterNotFound(id.to_string()))?;
        let stub = record
            .stubs
            .iter_mut()
            .find(|s| s.id == stub_id)
            .ok_or_else(|| Error::StubNotFound {
                imposter_id: id.to_string(),
                stub_id: stub_id.to_string(),
            })?;
        f(stub);
        Ok(stub.clone())
    }

    pub fn remove_stub(&self, id: &str, stub_id: &str) -> Result<Stub> {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| Error::ImposterNotFound(id.to_string()))?;
        let position = record
            .stubs
            .iter()
            .position(|s| s.id == stub_id)
            .ok_or_else(|| Error::StubNotFound {
                imposter_id: id.to_string(),
                stub_id: stub_id.to_string(),
            })?;
        Ok(record.stubs.remove(position))
    }
}
