use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("failed to create store directory {path} on `{stage}`: {source}"))]
    CreateStoreDir {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("failed to serialize store entries on `{stage}`: {source}"))]
    SerializeEntries {
        stage: &'static str,
        source: serde_json::Error,
    },

    #[snafu(display("failed to write store file {path} on `{stage}`: {source}"))]
    WriteStoreFile {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("failed to replace store file {path} on `{stage}`: {source}"))]
    ReplaceStoreFile {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;
