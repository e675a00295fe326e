//! Shared building blocks for the job-board agent relay: configuration,
//! error taxonomy, domain types and the signed session cookie.

pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod session_cookie;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::context::{
    CandidateJobDetails, DomainContext, Eligibility, SessionVariable, VariableType,
};
pub use domain::credential::{Credential, MAX_EXPIRES_IN_SECS};
pub use domain::session::{AgentMessage, SessionHandle};
pub use domain::turn::{Turn, TurnRole};
pub use errors::{InterfaceError, RelayError};
pub use session_cookie::{CookieAttributes, CookieError, SessionCookieCodec};
