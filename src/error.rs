use thiserror::Error;

/// Errors raised inside the globe scene.
///
/// None of these abort an update pass: layers log them and skip the
/// offending record.
#[derive(Debug, Error)]
pub enum GlobeError {
    #[error("texture {url} failed to load: {reason}")]
    TextureLoad { url: String, reason: String },

    #[error("unsupported GeoJson geometry type: {0}")]
    UnsupportedGeometry(String),

    #[error("record has no readable geometry")]
    MissingGeometry,

    #[error("triangulation failed: {0}")]
    Triangulation(String),

    #[error("font data could not be read: {0}")]
    Font(String),
}
