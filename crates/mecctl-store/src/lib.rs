pub mod convert;
pub mod ema;
pub mod error;
pub mod regression;
pub mod schema;
pub mod store;
pub mod trilateration;

pub use error::{Result, StoreError};
pub use store::{Store, CORRELATION_WINDOW_SECONDS, SENTINEL_BW_MBPS, SENTINEL_RTT_SECONDS};
