//! Network-edge concerns: trusted-proxy validation and forwarding-header
//! construction (§2 components 3-4).

pub mod forwarded;
pub mod trusted_proxy;

pub use forwarded::{ForwardedBuilder, ForwardedHop};
pub use trusted_proxy::TrustedProxyValidator;
