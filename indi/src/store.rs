//! Latest known state of every vector
//!
//! Definitions replace a vector, Sets merge into it by element name, and
//! `delProperty` marks it deleted without dropping it. A later Definition
//! of the same `device.name` clears the mark.

use std::collections::BTreeMap;

use crate::error::{IndiError, IndiResult};
use crate::property::{
    BlobElement, IndiEvent, LightElement, NumberElement, PropertyVector, SwitchElement,
    TextElement, VectorBody,
};
use crate::IndiOperation;

/// What applying an event did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Definition stored; `cleared_tombstone` when it revived a deleted vector
    Defined {
        replaced: bool,
        cleared_tombstone: bool,
    },
    /// Set merged into an existing definition
    Updated,
    /// Set for a vector that was never defined; not stored
    Undefined,
    /// Number of vectors marked deleted
    Deleted(usize),
    /// Nothing to store (messages, `new*` and `get*` vectors)
    Ignored,
}

#[derive(Debug, Clone)]
struct Entry {
    vector: PropertyVector,
    deleted: bool,
}

/// Snapshot store keyed by `(device, name)`
#[derive(Debug, Default)]
pub struct PropertyStore {
    entries: BTreeMap<(String, String), Entry>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one parsed event
    pub fn apply(&mut self, event: &IndiEvent) -> IndiResult<StoreOutcome> {
        match event {
            IndiEvent::Vector(v) => match v.operation {
                IndiOperation::Definition => Ok(self.define(v)),
                IndiOperation::Set => self.update(v),
                _ => Ok(StoreOutcome::Ignored),
            },
            IndiEvent::Delete(d) => Ok(StoreOutcome::Deleted(
                self.delete(&d.device, d.name.as_deref()),
            )),
            IndiEvent::Message(_) => Ok(StoreOutcome::Ignored),
        }
    }

    fn define(&mut self, vector: &PropertyVector) -> StoreOutcome {
        let key = (vector.device.clone(), vector.name.clone());
        let previous = self.entries.insert(
            key,
            Entry {
                vector: vector.clone(),
                deleted: false,
            },
        );
        StoreOutcome::Defined {
            replaced: previous.is_some(),
            cleared_tombstone: previous.map_or(false, |e| e.deleted),
        }
    }

    fn update(&mut self, set: &PropertyVector) -> IndiResult<StoreOutcome> {
        let Some(entry) = self
            .entries
            .get_mut(&(set.device.clone(), set.name.clone()))
        else {
            tracing::debug!("Set for undefined vector {}", set.key());
            return Ok(StoreOutcome::Undefined);
        };

        let stored = &mut entry.vector;
        if stored.kind() != set.kind() {
            return Err(IndiError::KindMismatch {
                device: set.device.clone(),
                property: set.name.clone(),
                defined: stored.kind(),
                received: set.kind(),
            });
        }

        if set.state.is_some() {
            stored.state = set.state;
        }
        for (field, value) in [
            (&mut stored.timeout, &set.timeout),
            (&mut stored.timestamp, &set.timestamp),
            (&mut stored.message, &set.message),
        ] {
            if value.is_some() {
                field.clone_from(value);
            }
        }
        for (key, value) in &set.attributes {
            // Identity and definition-only attributes stay as defined
            if !matches!(key.as_str(), "perm" | "rule" | "label" | "group") {
                stored.attributes.insert(key.clone(), value.clone());
            }
        }

        match (&mut stored.body, &set.body) {
            (VectorBody::Number { elements, .. }, VectorBody::Number { elements: new, .. }) => {
                merge_elements(elements, new)
            }
            (VectorBody::Text { elements, .. }, VectorBody::Text { elements: new, .. }) => {
                merge_elements(elements, new)
            }
            (VectorBody::Switch { elements, .. }, VectorBody::Switch { elements: new, .. }) => {
                merge_elements(elements, new)
            }
            (VectorBody::Light { elements }, VectorBody::Light { elements: new }) => {
                merge_elements(elements, new)
            }
            (VectorBody::Blob { elements, .. }, VectorBody::Blob { elements: new, .. }) => {
                merge_elements(elements, new)
            }
            _ => {}
        }

        Ok(StoreOutcome::Updated)
    }

    /// Mark one vector, or every vector of `device` when `name` is `None`
    fn delete(&mut self, device: &str, name: Option<&str>) -> usize {
        let mut count = 0;
        for ((d, n), entry) in self.entries.iter_mut() {
            if d == device && name.map_or(true, |name| n == name) {
                entry.deleted = true;
                count += 1;
            }
        }
        count
    }

    /// Latest snapshot, including deleted vectors
    pub fn get(&self, device: &str, name: &str) -> Option<&PropertyVector> {
        self.entry(device, name).map(|e| &e.vector)
    }

    pub fn is_defined(&self, device: &str, name: &str) -> bool {
        self.entry(device, name).is_some()
    }

    /// Whether the vector was removed by `delProperty` and not redefined since
    pub fn is_deleted(&self, device: &str, name: &str) -> bool {
        self.entry(device, name).map_or(false, |e| e.deleted)
    }

    /// Devices with at least one live vector, sorted
    pub fn devices(&self) -> Vec<&str> {
        let mut devices: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.deleted)
            .map(|((d, _), _)| d.as_str())
            .collect();
        devices.dedup();
        devices
    }

    /// Live vectors of one device, sorted by name
    pub fn vectors_for(&self, device: &str) -> Vec<&PropertyVector> {
        self.entries
            .iter()
            .filter(|((d, _), e)| d == device && !e.deleted)
            .map(|(_, e)| &e.vector)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn entry(&self, device: &str, name: &str) -> Option<&Entry> {
        self.entries.get(&(device.to_string(), name.to_string()))
    }
}

/// Element that can absorb a Set update
trait MergeElement: Clone {
    fn name(&self) -> &str;
    fn merge_from(&mut self, update: &Self);
}

fn merge_elements<T: MergeElement>(stored: &mut Vec<T>, updates: &[T]) {
    for update in updates {
        match stored.iter_mut().find(|e| e.name() == update.name()) {
            Some(existing) => existing.merge_from(update),
            None => {
                tracing::debug!("Set adds element {} missing from definition", update.name());
                stored.push(update.clone());
            }
        }
    }
}

fn keep_or_replace<T: Clone>(field: &mut Option<T>, update: &Option<T>) {
    if update.is_some() {
        field.clone_from(update);
    }
}

impl MergeElement for NumberElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn merge_from(&mut self, update: &Self) {
        self.value = update.value;
        self.raw.clone_from(&update.raw);
        keep_or_replace(&mut self.label, &update.label);
        keep_or_replace(&mut self.format, &update.format);
        keep_or_replace(&mut self.min, &update.min);
        keep_or_replace(&mut self.max, &update.max);
        keep_or_replace(&mut self.step, &update.step);
    }
}

impl MergeElement for TextElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn merge_from(&mut self, update: &Self) {
        self.value.clone_from(&update.value);
        keep_or_replace(&mut self.label, &update.label);
    }
}

impl MergeElement for SwitchElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn merge_from(&mut self, update: &Self) {
        self.value = update.value;
        keep_or_replace(&mut self.label, &update.label);
    }
}

impl MergeElement for LightElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn merge_from(&mut self, update: &Self) {
        self.value = update.value;
        keep_or_replace(&mut self.label, &update.label);
    }
}

impl MergeElement for BlobElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn merge_from(&mut self, update: &Self) {
        self.payload.clone_from(&update.payload);
        self.detected_format.clone_from(&update.detected_format);
        keep_or_replace(&mut self.label, &update.label);
        keep_or_replace(&mut self.format, &update.format);
        keep_or_replace(&mut self.size, &update.size);
    }
}
