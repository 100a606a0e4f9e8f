// store

mod document_store;

pub use document_store::*;

// directory

mod directory;

pub use directory::*;
