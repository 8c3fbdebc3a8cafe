//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive UI framework.
//! It implements:
//!
//! - Fine-grained reactivity (observed objects, refs, computed cells, effects,
//!   watchers)
//! - An opt-in batched job queue
//! - Virtual trees and a reconciler that patches them into a host DOM
//! - Components and an application shell
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Dependency tracking, wrappers and derived values
//! - `render`: Virtual nodes, the host interface and the reconciler
//! - `app`: Mounting a root component with plugins and registries
//! - `api`: Free functions over the thread's default runtime
//!
//! # Example
//!
//! ```rust
//! use trellis_core::api::{computed, create_ref, effect};
//!
//! let count = create_ref(1);
//! let doubled = computed({
//!     let count = count.clone();
//!     move || count.get().as_f64().unwrap_or(0.0) * 2.0
//! });
//!
//! let runner = effect(move || {
//!     println!("doubled: {}", doubled.get());
//! });
//!
//! // The effect re-runs and prints "doubled: 10".
//! count.set(5);
//! runner.stop();
//! ```

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod reactive;
pub mod render;

pub use app::{App, MountTarget, Plugin};
pub use config::{FlushMode, RuntimeConfig};
pub use error::{MountError, ReactivityError, ReconciliationError, Result, TrellisError};
pub use reactive::{Computed, Effect, Observed, Ref, Runtime, Tracked, Value};
pub use render::{h, Component, MemoryDom, Renderer, VNode};
