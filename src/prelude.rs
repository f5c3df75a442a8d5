//! Items used throughout the crate.
pub use anyhow::{Context, Result};
pub use log::{debug, info, trace, warn};
