//! Run artifacts written next to the delivered digest.
//!
//! # Output Structure
//!
//! ```text
//! report_dir/
//! ├── 2026-10-17.json
//! └── 2026-10-18.json
//! ```
//!
//! One file per run date; a second run on the same day overwrites the first.

pub mod json;
