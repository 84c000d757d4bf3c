//! Type system utilities and aliases.
//!
//! ## Modules
//!
//! - [`aliases`]: Type aliases for `Rc<RefCell<T>>`, lock-guarded maps, payloads, tasks.

pub mod aliases;

pub use aliases::*;
