//! Reference resolution and bundling for OpenAPI documents.
//!
//! refdex loads an OpenAPI specification plus every file its `$ref`
//! graph reaches (local filesystem and remote HTTP) into a rolodex of
//! per-file indexes, resolves the reference graph while detecting
//! circular chains, and bundles the result into a single self-contained
//! document.
//!
//! Two bundle modes are offered: [`bundle_bytes`] inlines each reference
//! site with a copy of its target (preserving discriminator-pinned and
//! circular references), and [`bundle_bytes_composed`] lifts external
//! components into the root's `components` section with collision-safe
//! renaming, rewriting every reference to its new local pointer.
//!
//! ```no_run
//! use refdex::{bundle_bytes, CancelToken, Config};
//!
//! # fn main() -> Result<(), refdex::Error> {
//! let spec = std::fs::read("openapi.yaml")?;
//! let config = Config::open_local("specs/");
//! let bundled = bundle_bytes(&spec, &config, &CancelToken::new())?;
//! # Ok(())
//! # }
//! ```

mod bundler;
mod cancel;
mod config;
mod error;
mod index;
mod local;
mod node;
mod remote;
mod resolver;
mod rolodex;
mod source;
mod types;

pub use bundler::{bundle_bytes, bundle_bytes_composed, bundle_document, Document};
pub use cancel::CancelToken;
pub use config::{CompositionConfig, Config};
pub use error::Error;
pub use index::Index;
pub use local::{LocalSource, LocalSourceConfig};
pub use node::{NodeId, NodeKind, ScalarStyle, Tree};
pub use remote::{RemoteSource, RemoteSourceConfig};
pub use rolodex::Rolodex;
pub use source::{FileBytes, FileSource};
pub use types::{CircularChain, ComponentKind, MappedRef, RefSite};
