//! # xsd-validate Library
//!
//! XML Schema (XSD) validation over libxml2, built for long-running services
//! that validate many documents concurrently against a few compiled schemas.
//!
//! The crate coordinates the native engine rather than reimplementing it:
//! a lifecycle guard around libxml2's process globals, owned handles for
//! compiled schemas and parsed documents, per-call diagnostic collection with
//! element path reconstruction, and an optional ticker returning freed native
//! memory to the operating system.
//!
//! ```no_run
//! use xsd_validate::{Options, XsdError};
//!
//! # fn main() -> Result<(), XsdError> {
//! xsd_validate::init()?;
//!
//! let schema = xsd_validate::new_schema_from_url("schemas/order.xsd", Options::default())?;
//! match xsd_validate::validate_buffer(&schema, b"<order/>", Options::default()) {
//!     Ok(()) => println!("valid"),
//!     Err(XsdError::Validation(err)) => {
//!         for diagnostic in err.diagnostics() {
//!             println!("{}: {}", diagnostic.path, diagnostic.message);
//!         }
//!     }
//!     Err(other) => return Err(other),
//! }
//!
//! xsd_validate::cleanup();
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod diagnostic;
pub mod engine;
pub mod error;
pub mod handle;
pub mod libxml2;
pub mod options;
mod reclaim;

pub use config::{ConfigError, ConfigManager, ConfigResult, EngineConfig, EnvProvider, SystemEnvProvider};
pub use diagnostic::{Diagnostic, Severity};
pub use engine::{
    Engine, cleanup, init, init_with_reclaim, new_document_from_buffer, new_schema_from_buffer,
    new_schema_from_url, validate, validate_buffer,
};
pub use error::{
    DiagnosticFormatter, DocumentParseKind, LifecycleError, Rendered, Result, ValidationError,
    XsdError,
};
pub use handle::{DocumentHandle, SchemaHandle};
pub use libxml2::{Libxml2Runtime, NativeRuntime};
pub use options::Options;
