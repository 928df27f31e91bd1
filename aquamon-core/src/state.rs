use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Exclusive state shared between a store handle and its event loop.
pub type Shared<T> = Arc<Mutex<T>>;

/// Read-mostly state: many readers, one writer replacing the whole value.
pub type SharedRead<T> = Arc<RwLock<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

pub fn new_read_state<T>(value: T) -> SharedRead<T> {
    Arc::new(RwLock::new(value))
}
