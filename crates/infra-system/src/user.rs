// OS user provider
// reason: whoami for a portable current-user lookup

use hubmon_core::port::user_provider::{UserProvider, UNKNOWN_USER};
use tracing::debug;

/// Reports the OS user running this process
#[derive(Debug, Default, Clone, Copy)]
pub struct OsUserProvider;

impl UserProvider for OsUserProvider {
    fn current_user(&self) -> String {
        match whoami::fallible::username() {
            Ok(name) if !name.is_empty() => name,
            Ok(_) => UNKNOWN_USER.to_string(),
            Err(e) => {
                debug!(error = %e, "Could not resolve current user");
                UNKNOWN_USER.to_string()
            }
        }
    }
}
