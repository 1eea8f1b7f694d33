//! Source drivers for manifold
//!
//! A driver turns a path on disk into [`File`]s whose resources carry both a
//! raw form (what is written in the repository) and a rendered form (what the
//! cluster would receive). Three drivers exist:
//!
//! - [`Kubernetes`]: plain manifests, raw and rendered are the same document
//! - [`Helm`]: a chart rendered with its values, matched back to the template files
//! - [`Kustomize`]: an overlay built in-process, matched back through origin annotations
//!
//! [`select_source`] picks the driver for a path.

pub mod error;
pub mod helm;
pub mod kubernetes;
pub mod kustomize;
pub mod merge;
pub mod paths;

pub use error::{Result, SourceError};
pub use helm::{Helm, HelmOptions};
pub use kubernetes::Kubernetes;
pub use kustomize::Kustomize;

use manifold_core::File;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Tag naming a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Helm,
    Kustomize,
    Kubernetes,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Helm => write!(f, "helm"),
            SourceKind::Kustomize => write!(f, "kustomize"),
            SourceKind::Kubernetes => write!(f, "kubernetes"),
        }
    }
}

/// Common driver contract
pub trait Source {
    fn kind(&self) -> SourceKind;

    /// Root path the driver was created for
    fn path(&self) -> &Path;

    /// Cheap structural probe; nothing is rendered
    fn is_valid_path(&self) -> bool;

    /// Resolve every file under the path.
    ///
    /// Any error aborts the whole call; no partial result is returned.
    fn resource_files(&self) -> Result<Vec<File>>;
}

/// Configuration handed to drivers at construction time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceOptions {
    pub helm: HelmOptions,
}

/// A selected driver
#[derive(Debug, Clone)]
pub enum Driver {
    Helm(Helm),
    Kustomize(Kustomize),
    Kubernetes(Kubernetes),
}

impl Driver {
    /// Narrow to the Helm driver, e.g. to change its values file
    pub fn as_helm_mut(&mut self) -> Option<&mut Helm> {
        match self {
            Driver::Helm(helm) => Some(helm),
            _ => None,
        }
    }

    fn inner(&self) -> &dyn Source {
        match self {
            Driver::Helm(helm) => helm,
            Driver::Kustomize(kustomize) => kustomize,
            Driver::Kubernetes(kubernetes) => kubernetes,
        }
    }
}

impl Source for Driver {
    fn kind(&self) -> SourceKind {
        self.inner().kind()
    }

    fn path(&self) -> &Path {
        self.inner().path()
    }

    fn is_valid_path(&self) -> bool {
        self.inner().is_valid_path()
    }

    fn resource_files(&self) -> Result<Vec<File>> {
        self.inner().resource_files()
    }
}

/// Probe `path` with Helm, then Kustomize, then Kubernetes.
///
/// The first driver that recognizes the path wins.
#[instrument(skip(options), level = "debug")]
pub fn select_source(path: &Path, options: &SourceOptions) -> Result<Driver> {
    let candidates = [
        Driver::Helm(Helm::new(path, options.helm.clone())),
        Driver::Kustomize(Kustomize::new(path)),
        Driver::Kubernetes(Kubernetes::new(path)),
    ];

    for driver in candidates {
        if driver.is_valid_path() {
            debug!("Selected {} source for {}", driver.kind(), path.display());
            return Ok(driver);
        }
    }

    Err(SourceError::NotRecognized(PathBuf::from(path)))
}
