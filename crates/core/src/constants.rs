//! Constants used throughout the Mixlab core crate.
//!
//! Path names, filenames and domain defaults live here so the store, the engine and the
//! binaries agree on them.

/// Default directory for data storage when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "mixlab_data";

/// Directory name (under the data directory) for formulation records.
pub const FORMULATIONS_DIR_NAME: &str = "formulations";

/// Filename of the YAML record inside each formulation directory.
pub const FORMULATION_FILENAME: &str = "formulation.yaml";

/// Batch volume used when a stored record carries no usable value.
pub const DEFAULT_BATCH_VOLUME_ML: f64 = 500.0;

/// Title shown for formulations saved with a blank title.
pub const UNTITLED_TITLE: &str = "Untitled";

/// Suffix appended to the title of a duplicated formulation.
pub const COPY_SUFFIX: &str = " (Copy)";

/// Logical folder for uploaded cover images.
pub const COVERS_PREFIX: &str = "covers";

/// Component rows of a freshly seeded formulation: (name, parts).
pub const SEED_ROWS: [(&str, f64); 2] = [("Ethanol", 45.0), ("Calone (10%)", 12.0)];
