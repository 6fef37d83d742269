pub mod config;
pub mod error;
pub mod ids;
pub mod keys;
pub mod package;
pub mod policy;
pub mod section;
pub mod sections;

pub use error::{EclipseError, EclipseResult};
pub use package::{BackupPackage, PackageKind, FORMAT_VERSION};
pub use section::{Section, SectionSet};
