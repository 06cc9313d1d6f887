//! Manifest rendering for Tigera components
//!
//! Each component turns its configuration into the Kubernetes objects to
//! create and the objects to remove. Rendering is pure: nothing here talks
//! to the API server, so the controller and the offline `render` command
//! share the same code.

#![deny(missing_docs)]

pub mod certificate_management;
pub mod common;
pub mod compliance;
pub mod elasticsearch;
pub mod images;
pub mod key_validator;
pub mod manager;
mod manifest;

pub use manifest::{to_yaml_stream, Manifest};

use tigera_common::crd::ImageSet;
use tigera_common::Result;

/// A renderable unit of the install
pub trait Component: Send + Sync {
    /// Short name used in logs and errors (e.g., "manager")
    fn name(&self) -> &str;

    /// Resolve container images, pinning digests from `image_set` when given
    ///
    /// Called once before [`Component::objects`].
    fn resolve_images(&mut self, image_set: Option<&ImageSet>) -> Result<()>;

    /// Objects to apply, and objects to delete
    fn objects(&self) -> Result<(Vec<Manifest>, Vec<Manifest>)>;

    /// Whether the component can be rendered now
    fn ready(&self) -> bool;
}
