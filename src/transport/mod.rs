pub mod https;
pub mod traits;

pub use https::{endpoint_authority, DeliveryConfig, HttpsDelivery, TrustMode};
pub use traits::{Delivery, DeliveryOutcome, TransportError};
