//! Job working-directory identity.
//!
//! A job starts under a random temporary handle and may be renamed once to a
//! semantic handle derived from its generated prompt.

mod error;
mod handle;
mod manager;

pub use error::IdentityError;
pub use handle::{sanitize_handle, short_id, MAX_HANDLE_LEN};
pub use manager::{JobIdentityManager, RenamedJob};
