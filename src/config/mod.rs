//! Configuration for the warden engine.
//!
//! Configuration lives in `warden.yaml` at the orchestration root. Every
//! field has a default, so an empty (or absent) file yields a working
//! engine; unknown fields are ignored for forward compatibility.

mod model;
mod operations;
mod types;


pub use model::Config;
pub use types::Priority;
