use thiserror::Error;

/// Failures produced while turning raw route text into a track. All of
/// these are recoverable by the caller; a bad input never poisons the
/// records that were already accepted.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid GPX: {0}")]
    MalformedGpx(String),

    /// The single user-facing diagnostic for "nothing recognizable was
    /// found", shared by every format branch.
    #[error(
        "not enough valid GPS points found; supported formats: GPX, encoded polyline, \
         JSON array of [lat, lon] pairs, CSV lines of lat,lon, whitespace separated \
         lat lon pairs, or a Google Maps URL"
    )]
    InsufficientPoints,

    #[error("could not extract a polyline from the URL")]
    NoPolylineFound,

    #[error("invalid point format in JSON")]
    InvalidPointFormat,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("malformed encoded polyline: input ends mid group at offset {offset}")]
    MalformedCodec { offset: usize },
}
