//! Observable list of rows for presentation layers.
//!
//! Listeners are invoked synchronously after each mutation completes and after the
//! row lock is released, so a listener may read the model it observes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::descriptor::FieldKind;
use crate::error::FieldError;
use crate::message::DynamicMessage;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Row ranges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChange {
    Inserted { first: usize, last: usize },
    Removed { first: usize, last: usize },
    Changed { index: usize },
    Reset,
}

type Listener = Arc<dyn Fn(&ModelChange) + Send + Sync>;

pub struct ListModel<T> {
    rows: RwLock<Vec<T>>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl<T: Clone> ListModel<T> {
    pub fn new() -> Self {
        Self::from_rows(Vec::new())
    }

    pub fn from_rows(rows: Vec<T>) -> Self {
        Self {
            rows: RwLock::new(rows),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.rows.read().get(index).cloned()
    }

    pub fn rows(&self) -> Vec<T> {
        self.rows.read().clone()
    }

    pub fn on_change(&self, listener: impl Fn(&ModelChange) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(candidate, _)| *candidate != id);
        listeners.len() != before
    }

    pub fn push(&self, row: T) {
        let index = {
            let mut rows = self.rows.write();
            rows.push(row);
            rows.len() - 1
        };
        self.notify(ModelChange::Inserted {
            first: index,
            last: index,
        });
    }

    /// Inserts at `index`; returns `false` when `index` is past the end.
    pub fn insert(&self, index: usize, row: T) -> bool {
        {
            let mut rows = self.rows.write();
            if index > rows.len() {
                return false;
            }
            rows.insert(index, row);
        }
        self.notify(ModelChange::Inserted {
            first: index,
            last: index,
        });
        true
    }

    /// Replaces the row at `index`, returning the previous row.
    pub fn set(&self, index: usize, row: T) -> Option<T> {
        let previous = {
            let mut rows = self.rows.write();
            let slot = rows.get_mut(index)?;
            std::mem::replace(slot, row)
        };
        self.notify(ModelChange::Changed { index });
        Some(previous)
    }

    pub fn remove(&self, index: usize) -> Option<T> {
        let removed = {
            let mut rows = self.rows.write();
            if index >= rows.len() {
                return None;
            }
            rows.remove(index)
        };
        self.notify(ModelChange::Removed {
            first: index,
            last: index,
        });
        Some(removed)
    }

    pub fn reset(&self, rows: Vec<T>) {
        *self.rows.write() = rows;
        self.notify(ModelChange::Reset);
    }

    pub fn clear(&self) {
        let count = {
            let mut rows = self.rows.write();
            let count = rows.len();
            rows.clear();
            count
        };
        if count > 0 {
            self.notify(ModelChange::Removed {
                first: 0,
                last: count - 1,
            });
        }
    }

    fn notify(&self, change: ModelChange) {
        // Snapshot so listeners can register or remove listeners themselves.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&change);
        }
    }
}

impl ListModel<DynamicMessage> {
    /// Replaces all rows with the elements of a repeated message field.
    pub fn reset_from_field(&self, message: &DynamicMessage, number: u32) -> Result<(), FieldError> {
        let descriptor = message.descriptor();
        let field = descriptor.field(number).ok_or_else(|| FieldError::UnknownField {
            message: descriptor.full_name,
            field: number.to_string(),
        })?;
        if !(field.is_repeated() && matches!(field.kind, FieldKind::Message(_))) {
            return Err(FieldError::TypeMismatch {
                message: descriptor.full_name,
                field: field.name,
                expected: "repeated message".to_string(),
                found: field.type_description(),
            });
        }
        let rows = message
            .field(number)
            .and_then(Value::as_list)
            .map(|items| items.iter().filter_map(Value::as_message).cloned().collect())
            .unwrap_or_default();
        self.reset(rows);
        Ok(())
    }
}

impl<T: Clone> Default for ListModel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ListModel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListModel")
            .field("rows", &*self.rows.read())
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}
