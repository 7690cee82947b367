use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("[Search Eval] io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[Search Eval] json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("[Search Eval] invalid dataset: {0}")]
    Dataset(String),

    #[error("[Search Eval] config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EvalError>;
