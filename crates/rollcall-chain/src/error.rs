use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("rpc transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed rpc response: {0}")]
    InvalidResponse(String),
    #[error("abi: {0}")]
    Abi(#[from] ethabi::Error),
    #[error("{function} returned unexpected output: {detail}")]
    UnexpectedOutput {
        function: &'static str,
        detail: String,
    },
    #[error("invalid address {0:?}")]
    InvalidAddress(String),
    #[error("contract artifact: {0}")]
    Artifact(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
