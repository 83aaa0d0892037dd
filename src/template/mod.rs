//! Template lookup and payload merging.
//!
//! - `resolver` - finds `<name>.<ext>` (and logos) on disk without escaping the roots
//! - `merge` - `{{key}}` text substitution and AcroForm field substitution

pub mod merge;
pub mod resolver;

pub use merge::{merge_fields, merge_text, merge_text_strict, stringify, FieldSet, MergeError};
pub use resolver::{TemplateError, TemplateResolver};
