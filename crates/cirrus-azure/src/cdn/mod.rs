//! Azure CDN: profiles and the endpoints they serve

mod endpoint;
mod profile;

pub use endpoint::{
    CdnEndpoint, EndpointFinder, EndpointType, GeoFilter, GeoFilterAction, Origin,
    QueryStringCaching,
};
pub use profile::{CdnProfile, CdnSku, ProfileRef};
