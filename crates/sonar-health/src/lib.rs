//! sonar-health: status probing for the local SonarQube service.
//!
//! Issues a bounded-timeout GET against the SonarQube status endpoint,
//! retries transient failures with exponential backoff, and classifies
//! the outcome into a [`ServiceState`].
//!
//! # Architecture
//!
//! ```text
//! HealthProber<T: StatusTransport>
//!   ├── probe()          → bool (running or not)
//!   ├── probe_detailed() → HealthStatus
//!   │   ├── T::get() per attempt (HttpTransport in production)
//!   │   ├── classify_response() on any HTTP answer
//!   │   ├── backoff_delay() between failed attempts (500ms → 5s cap)
//!   │   └── classify_failure() once attempts are exhausted
//!   └── ServiceProbe impl for the sequencer
//! ```
//!
//! The prober never returns an error: every transport or parse failure
//! ends up as a classified [`HealthStatus`].
//!
//! [`ServiceState`]: sonar_core::ServiceState
//! [`HealthStatus`]: sonar_core::HealthStatus

pub mod checker;
pub mod transport;

pub use checker::{
    backoff_delay, classify_failure, classify_response, HealthProber, ProbeFuture, ServiceProbe,
};
pub use transport::{HttpTransport, StatusRequest, StatusResponse, StatusTransport, TransportError};
