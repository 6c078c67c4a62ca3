use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("nonce space exhausted mining block {index} at difficulty {difficulty} after {attempts} attempts")]
    MiningExhausted {
        index: u64,
        difficulty: u32,
        attempts: u64,
    },

    #[error("transaction pool is empty and empty blocks are disabled")]
    EmptyPool,

    #[error("difficulty {0} is outside 1..={max}", max = crate::constants::MAX_DIFFICULTY)]
    InvalidDifficulty(u32),

    #[error("malformed chain data: {0}")]
    ImportFormat(String),

    #[error("block {0} does not exist")]
    BlockNotFound(u64),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
