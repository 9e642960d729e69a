pub mod exports;
pub mod file_reader;
pub(crate) mod flatbuf;
pub mod materialize;
pub mod metadata;
pub mod schema_builder;
pub mod slicer;
