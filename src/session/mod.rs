//! Session contexts
//!
//! The wire protocol is one request, one response. State that spans two
//! messages of the same session, such as a DELETE awaiting confirmation,
//! lives here.

mod manager;

pub use manager::{DeleteConfirmation, SessionContext, SessionManager};
