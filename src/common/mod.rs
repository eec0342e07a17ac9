pub mod clock;
pub mod config;
pub mod errors;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, FallbackAuth, RetryConfig};
pub use errors::ApiError;
