#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Core of fnpack: turns a server-rendered app build into deployable
//! serverless functions.
//!
//! - [`routes`] partitions URL prefixes across server bundles.
//! - [`trace`] and [`pack`] copy a bundle's runtime closure into a function
//!   directory, preserving symlinks.
//! - [`preset`] orchestrates bundling and packaging per deployment target.
//! - [`dev`] and [`exclude`] classify dev-server requests.

pub mod bundler;
pub mod config;
pub mod dev;
pub mod error;
pub mod exclude;
pub mod manifest;
pub mod pack;
pub mod paths;
pub mod preset;
pub mod routes;
pub mod trace;
pub mod version;

pub use bundler::{BundleError, BundleRequest, Bundler, EsbuildBundler};
pub use config::{Config, PresetConfig, PresetKind};
pub use dev::{DevRouter, Dispatch};
pub use error::{Error, Result};
pub use exclude::{create_exclude_patterns, should_exclude, ExcludePattern, ExcludeSource};
pub use manifest::{BuildManifest, RouteNode, ServerBundle};
pub use pack::{pack_function, PackOptions, PackedFunction};
pub use preset::{run_preset, BuildContext, BuildReport};
pub use routes::{partition, paths_for_bundle, BundlePathEntry};
pub use trace::{NodeTracer, TraceCache, Tracer};
pub use version::VERSION;
