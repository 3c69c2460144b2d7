use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("Invalid proxy URL {url}: {source}")]
    Proxy {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Connect timeout must be shorter than the request timeout")]
    InvalidTimeouts,
}
