//! Custom extractors.

mod inject;

pub use inject::Inject;
