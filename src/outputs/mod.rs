//! Output collaborators for a finished run.
//!
//! Everything here consumes a [`ResultSet`](crate::models::ResultSet) and
//! never feeds back into the pipeline; a failed write is logged by the caller
//! and the run still succeeds.
//!
//! # Submodules
//!
//! - [`digest`]: Plain-text and HTML digests of the ranked items
//! - [`json`]: Timestamped JSON snapshot of the run
//! - [`log`]: Append-only CSV log of every item ever reported
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── digest.txt
//! ├── digest.html
//! ├── editais_20240510T070000Z.json
//! └── editais_log.csv        # unless --log-file points elsewhere
//! ```

pub mod digest;
pub mod json;
pub mod log;
