use thiserror::Error;

/// Caller input errors, raised at the public operation boundary.
///
/// Network and payload failures never show up here: they degrade to
/// "no data" inside the fetcher.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("invalid entity id `{0}`, expected shard.realm.num")]
    InvalidEntityId(String),

    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("{name} must not be negative, got {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("symbol must not be empty")]
    EmptySymbol,
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn ensure_positive(name: &'static str, value: f64) -> Result<()> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(Error::NonPositive { name, value })
    }
}

pub(crate) fn ensure_non_negative(name: &'static str, value: f64) -> Result<()> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(Error::Negative { name, value })
    }
}
