//! A tri-color incremental, generational mark-and-sweep collector for an
//! embeddable dynamic-language runtime.
//!
//! The heap is a set of fixed-slot pages (`page`, `heap`); objects are
//! painted white/gray/black across incremental `ROOT`/`MARK`/`SWEEP` steps
//! (`header`, `marker`, `sweeper`, `scheduler`) and kept alive across calls
//! into the host through a bounded temporary arena (`arena`) or the hidden
//! root registry (`registry`). Write barriers (`barrier`) keep the tri-color
//! invariant intact when mutated code creates a black-to-white edge.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc as rust_alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod arena;
pub mod barrier;
pub mod builtin_classes;
pub mod config;
pub mod context;
pub mod error;
pub mod gc;
pub mod header;
pub mod heap;
pub mod host_alloc;
pub mod host_mark;
pub mod marker;
pub mod object;
pub mod page;
pub mod registry;
pub mod scheduler;
pub mod slot;
pub mod sweeper;
pub mod value;

pub use config::{ArenaMode, GcConfig};
pub use error::GcError;
pub use gc::Gc;
pub use header::TypeTag;
pub use host_mark::HostMark;
pub use value::{Immediate, ObjRef, Symbol, Value};

#[cfg(feature = "derive")]
pub use cinder_gc_derive::HostMark;
