use thiserror::Error;

/// Errors raised by the retiling engine and its ambient stack.
#[derive(Error, Debug)]
pub enum RetileError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("table already holds {existing} tiles; cannot add {requested} tiles to the same table")]
    FormatConflict {
        existing: &'static str,
        requested: &'static str,
    },

    #[error("coordinate math error: {0}")]
    CoordMath(String),

    #[error(transparent)]
    Sqlite(#[from] r2d2_sqlite::rusqlite::Error),

    #[error(transparent)]
    Pool(#[from] r2d2::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, RetileError>;
