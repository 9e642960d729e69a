mod test_file_reader;
