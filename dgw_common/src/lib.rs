//! Value types shared by the gateway engine and server.
//!
//! * [`Wei`] is an on-chain amount in the smallest unit, backed by a 256-bit integer.
//! * [`FiatAmount`] is a catalog/invoice price in minor units.
//! * [`Secret`] keeps keys and API tokens out of logs.
mod fiat;
pub mod helpers;
mod secret;
mod wei;

pub use fiat::{FiatAmount, FiatConversionError, DEFAULT_FIAT_CURRENCY};
pub use secret::Secret;
pub use wei::{Wei, WeiConversionError, WEI_PER_NATIVE};
