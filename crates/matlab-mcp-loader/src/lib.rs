//! # matlab-mcp-loader
//!
//! Runtime loading of the MATLAB native libraries.
//!
//! This crate provides:
//! - [`DynamicLibrary`]: load/unload one shared library and resolve entry
//!   points lazily, caching each bound pointer until unload
//! - [`ffi`]: the typed binding table of every native entry point used
//! - [`LibraryRegistry`]: the engine, matrix and MAT-file libraries
//! - [`testing`]: an in-process fake loader for tests
//!
//! Nothing here links against MATLAB at build time.
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on matlab-mcp-core and
//! is used by matlab-mcp-session.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ffi;
pub mod library;
pub mod loader;
pub mod registry;
pub mod testing;

// Re-export commonly used types
pub use ffi::{BoundFn, Engine, EntryPoint, LibraryKind, RawArray};
pub use library::DynamicLibrary;
pub use loader::{LibraryLoader, LoadedImage, SystemLoader};
pub use registry::LibraryRegistry;
