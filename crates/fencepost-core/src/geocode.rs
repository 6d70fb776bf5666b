//! Reverse geocoding of coordinates into display addresses.
//!
//! Lookups are best-effort: the location source bounds them with a timeout
//! and keeps the sample unaddressed on any failure.

use futures::future::BoxFuture;
use serde::Deserialize;
use thiserror::Error;

use crate::types::Coordinate;

/// Default BigDataCloud reverse-geocoding endpoint.
pub const DEFAULT_GEOCODER_ENDPOINT: &str =
    "https://api.bigdatacloud.net/data/reverse-geocode-client";

/// Errors from a reverse-geocoding lookup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeocodeError {
    /// The configured endpoint is not a valid URL.
    #[error("Invalid geocoder endpoint: {0}")]
    InvalidEndpoint(String),

    /// The request could not be sent or completed.
    #[error("Geocoding request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status.
    #[error("Geocoding service returned HTTP {0}")]
    Status(u16),

    /// The response body was not understood.
    #[error("Failed to decode geocoding response: {0}")]
    Decode(String),
}

/// Turns coordinates into a human-readable address.
pub trait ReverseGeocoder: Send + Sync + 'static {
    /// Look up the address for `coordinate`.
    fn reverse(&self, coordinate: Coordinate) -> BoxFuture<'_, Result<String, GeocodeError>>;
}

/// The subset of a BigDataCloud response used to build an address.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReverseGeocodeResponse {
    #[serde(default)]
    locality: Option<String>,
    #[serde(default)]
    principal_subdivision: Option<String>,
    #[serde(default)]
    country_name: Option<String>,
}

/// Render `"locality, subdivision, country"`, or the fixed-precision
/// coordinates when the service does not know the locality.
fn format_address(response: &ReverseGeocodeResponse, coordinate: Coordinate) -> String {
    fn non_empty(part: &Option<String>) -> Option<&str> {
        part.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    if non_empty(&response.locality).is_none() {
        return coordinate.to_fixed_string();
    }

    [
        &response.locality,
        &response.principal_subdivision,
        &response.country_name,
    ]
    .into_iter()
    .filter_map(non_empty)
    .collect::<Vec<_>>()
    .join(", ")
}

#[cfg(feature = "http-geocoder")]
pub use http::HttpReverseGeocoder;

#[cfg(feature = "http-geocoder")]
mod http {
    use futures::future::{BoxFuture, FutureExt};
    use tracing::debug;
    use url::Url;

    use super::{format_address, GeocodeError, ReverseGeocodeResponse, ReverseGeocoder};
    use crate::types::Coordinate;

    /// Reverse geocoder backed by the BigDataCloud client API.
    #[derive(Debug, Clone)]
    pub struct HttpReverseGeocoder {
        client: reqwest::Client,
        endpoint: Url,
        language: String,
    }

    impl HttpReverseGeocoder {
        /// Create a geocoder for `endpoint`, asking for results in `language`.
        ///
        /// # Errors
        ///
        /// Returns [`GeocodeError::InvalidEndpoint`] if `endpoint` does not parse.
        pub fn new(endpoint: &str, language: impl Into<String>) -> Result<Self, GeocodeError> {
            let endpoint =
                Url::parse(endpoint).map_err(|e| GeocodeError::InvalidEndpoint(e.to_string()))?;
            Ok(Self {
                client: reqwest::Client::new(),
                endpoint,
                language: language.into(),
            })
        }

        fn request_url(&self, coordinate: Coordinate) -> Url {
            let mut url = self.endpoint.clone();
            url.query_pairs_mut()
                .append_pair("latitude", &coordinate.latitude.to_string())
                .append_pair("longitude", &coordinate.longitude.to_string())
                .append_pair("localityLanguage", &self.language);
            url
        }

        async fn lookup(&self, coordinate: Coordinate) -> Result<String, GeocodeError> {
            let url = self.request_url(coordinate);
            debug!(%url, "Reverse geocoding");

            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| GeocodeError::Request(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(GeocodeError::Status(status.as_u16()));
            }

            let body: ReverseGeocodeResponse = response
                .json()
                .await
                .map_err(|e| GeocodeError::Decode(e.to_string()))?;

            Ok(format_address(&body, coordinate))
        }
    }

    impl ReverseGeocoder for HttpReverseGeocoder {
        fn reverse(&self, coordinate: Coordinate) -> BoxFuture<'_, Result<String, GeocodeError>> {
            self.lookup(coordinate).boxed()
        }
    }

}
