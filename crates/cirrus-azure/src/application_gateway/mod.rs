//! Application gateways
//!
//! The gateway resource declares everything in one object. SSL
//! certificates can also be managed on a live gateway through the functions
//! in [`certificate`], which back the `cirrus application-gateway` commands.

pub mod certificate;
mod gateway;

pub use gateway::{
    ApplicationGateway, BackendPool, CertificateSource, FrontendPort, GatewayProbe, GatewaySku,
    HttpSettings, Listener, Protocol, RoutingRule, SslCertificate,
};

pub(crate) const API_VERSION: &str = "2023-09-01";

/// Name of the frontend IP configuration every gateway is created with
pub(crate) const FRONTEND_IP: &str = "appGatewayFrontendIP";

/// Name of the gateway IP configuration (the subnet binding)
pub(crate) const GATEWAY_IP: &str = "appGatewayIpConfig";
