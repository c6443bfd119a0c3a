//! Output writers.
//!
//! - [`json`]: writes a harvest's records and skipped URLs as one JSON
//!   document per keyword
//!
//! ```text
//! output_dir/
//! └── 2025-05-06/
//!     ├── renewable-diesel.json
//!     └── used-cooking-oil.json
//! ```

pub mod json;
