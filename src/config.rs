//! Reader configuration.

/// Upper bound on a single metadata block unless configured otherwise.
pub const DEFAULT_MAX_METADATA_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "tools-json",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct ReadOptions {
    /// Metadata blocks longer than this are rejected before decoding.
    pub max_metadata_len: usize,
    /// Require the streamed schema to equal the schema recorded in the footer.
    pub check_footer_schema: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            max_metadata_len: DEFAULT_MAX_METADATA_LEN,
            check_footer_schema: true,
        }
    }
}

impl ReadOptions {
    pub fn set_max_metadata_len(&mut self, len: usize) -> &mut Self {
        self.max_metadata_len = len;
        self
    }

    pub fn set_check_footer_schema(&mut self, enabled: bool) -> &mut Self {
        self.check_footer_schema = enabled;
        self
    }
}
