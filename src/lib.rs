//! Client data core for a diamond-inventory Telegram Mini App.
//!
//! Layers, bottom up: a TTL [`cache`], an authenticated [`http`] wrapper,
//! a [`query`] layer adding single-flight de-duplication and
//! stale-while-revalidate, a [`session`] provider that resolves the
//! current user within a bounded timeout, and capability [`gate`]s in
//! front of protected content. [`inventory`] holds the typed domain
//! calls built on top.

pub mod cache;
pub mod common;
pub mod gate;
pub mod http;
pub mod inventory;
pub mod query;
pub mod session;

pub use common::{ApiError, AppConfig, Clock, ManualClock, SystemClock};
pub use gate::{AccessGate, Capability, GateOutcome};
pub use http::{AuthContext, Credential, HttpClient};
pub use query::{QueryClient, QueryOutcome};
pub use session::{AuthSource, AuthState, Session, SessionProvider};
