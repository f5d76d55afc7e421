#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("location unreachable: {0}")]
    LocationUnreachable(String),

    #[error("invalid location: {0}")]
    InvalidLocation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("Thumbnail error: {0}")]
    Thumbnail(String),

    #[error("{0}")]
    General(String),
}
