//! AR scan verification.

use super::types::ArMarker;

/// Decides whether a scan payload matches a token's AR marker.
///
/// Marker recognition happens on the client; the engine only sees the
/// payload it reports.
pub trait ScanValidator: Send + Sync {
    fn validate(&self, payload: &str, marker: Option<&ArMarker>) -> bool;
}

/// Accepts a scan when the payload equals the marker data.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerMatchValidator;

impl ScanValidator for MarkerMatchValidator {
    fn validate(&self, payload: &str, marker: Option<&ArMarker>) -> bool {
        marker.is_some_and(|m| !m.data.is_empty() && m.data == payload.trim())
    }
}

impl<F> ScanValidator for F
where
    F: Fn(&str, Option<&ArMarker>) -> bool + Send + Sync,
{
    fn validate(&self, payload: &str, marker: Option<&ArMarker>) -> bool {
        self(payload, marker)
    }
}
