// Error type shared by the library modules. The binary wraps these in
// `anyhow` for context; inside the crate every fallible call returns
// `crate::error::Result`.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required local configuration file (the OAuth client secret) is absent.
    #[error("{} not found. Download it from the Google Cloud Console.", .0.display())]
    ConfigMissing(PathBuf),

    #[error("invalid Google Classroom link: {0}")]
    InvalidLink(String),

    #[error("failed to decode course ID: {0}")]
    Decode(String),

    #[error("error accessing course {id}: {source}")]
    CourseFetch {
        id: String,
        #[source]
        source: Box<Error>,
    },

    /// The directory could not be created or is not a directory.
    #[error("directory {} could not be created or is not accessible: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Non-2xx response; keeps the body because Google puts the reason there.
    #[error("{url} returned {status}: {body}")]
    Api {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid API base URL: {0}")]
    BaseUrl(String),

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn directory(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Directory {
            path: path.into(),
            source,
        }
    }
}
