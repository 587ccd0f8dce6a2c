//! Plain request/response views.
//!
//! # Data Flow
//! ```text
//! host request parts
//!     → bridge::project → RawRequest + RawResponse
//!     → handlers read/mutate the request, write/end the response
//!     → bridge::reconcile (request) or take_response (response)
//! ```

pub mod request;
pub mod response;

/// Property bag shared by the plain and decorated requests.
pub type Props = serde_json::Map<String, serde_json::Value>;

pub use request::{Enhancement, RawRequest};
pub use response::{Finish, RawResponse};
