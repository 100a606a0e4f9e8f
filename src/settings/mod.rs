//! Settings loading is a simple utility verified by hand; the demo
//! binaries under `src/bin/` exercise it end to end.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
