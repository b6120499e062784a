pub mod archive;
pub mod backend;
pub mod path;
pub mod tree;
pub mod zip_reader;
