//! Type aliases for commonly used complex types.
//!
//! The bus runs single-threaded, so most shared state is `Rc<RefCell<T>>`.
//! The few stores that may be handed to other threads (persistent key/value
//! storage) use `parking_lot` locks behind an `Arc`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use avbus_core::types::*;
//!
//! // Instead of: Rc<RefCell<Vec<f64>>>
//! let seen: SharedVec<f64> = shared(Vec::new());
//! ```

use parking_lot::RwLock;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

// =============================================================================
// SINGLE-THREADED SHARED TYPES (Rc<RefCell<T>>)
// =============================================================================

/// A reference-counted, interior-mutable wrapper for single-threaded sharing.
///
/// This is the building block for bus, subject and consumer state.
pub type Shared<T> = Rc<RefCell<T>>;

/// A shared vector, typically used by handlers to collect received values.
pub type SharedVec<T> = Rc<RefCell<Vec<T>>>;

// =============================================================================
// THREAD-SAFE SHARED TYPES
// =============================================================================

/// A thread-safe reader-writer hash map.
///
/// Uses `parking_lot::RwLock` for better performance than `std::sync::RwLock`.
pub type ThreadSafeRwMap<K, V> = Arc<RwLock<HashMap<K, V>>>;

// =============================================================================
// BUS TYPES
// =============================================================================

/// A type-erased payload as stored in the bus cache and sync queues.
pub type SharedPayload = Rc<dyn Any>;

/// A deferred unit of work handed to a host scheduler.
pub type Task = Box<dyn FnOnce()>;

// =============================================================================
// CONSTRUCTOR HELPERS
// =============================================================================

/// Create a new `Shared<T>` from a value.
///
/// # Example
/// ```rust,ignore
/// let state = shared(Vec::<f64>::new());
/// ```
#[inline]
pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// Create a new empty `ThreadSafeRwMap<K, V>`.
#[inline]
pub fn thread_safe_rw_map<K, V>() -> ThreadSafeRwMap<K, V> {
    Arc::new(RwLock::new(HashMap::new()))
}
