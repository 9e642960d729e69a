pub mod batch;
pub mod codec;
pub mod config;
pub mod error;
pub mod registry;
pub mod schema;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixture;

pub use crate::codec::exports::{read_file, read_file_partial, read_file_with_options};
pub use crate::codec::file_reader::{FileContents, FileReader, PartialRead};
pub use crate::error::{Error, Result};

#[cfg(test)]
mod tests;
