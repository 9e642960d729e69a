use crate::Result;
use crate::codec::file_reader::{FileContents, FileReader, PartialRead};
use crate::config::ReadOptions;

pub fn read_file(bytes: &[u8]) -> Result<FileContents<'_>> {
    FileReader::try_new(bytes)?.read()
}

pub fn read_file_with_options(bytes: &[u8], options: ReadOptions) -> Result<FileContents<'_>> {
    FileReader::with_options(bytes, options)?.read()
}

pub fn read_file_partial(bytes: &[u8], options: ReadOptions) -> Result<PartialRead<'_>> {
    Ok(FileReader::with_options(bytes, options)?.read_partial())
}
