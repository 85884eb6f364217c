/// Errors from reading or persisting the metadata file.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading, writing or renaming the backing file failed.
    #[error("Metadata store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file is not a valid JSON object of records.
    #[error("Metadata store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
