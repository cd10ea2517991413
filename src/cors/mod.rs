//! Origin allow-listing and CORS header negotiation.

pub mod origin;
pub mod policy;

pub use origin::{OriginMatcher, OriginPattern};
pub use policy::{AllowedMethods, CorsDecision, CorsPolicy, OriginVerdict, UnsupportedMethod};

/// Request headers browsers may send on cross-origin calls to the gateway.
pub const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
