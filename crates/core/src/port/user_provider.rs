// User Provider Port

/// Reported when the OS cannot tell who we are
pub const UNKNOWN_USER: &str = "<unknown>";

/// Resolves the OS user running the job
pub trait UserProvider: Send + Sync {
    fn current_user(&self) -> String;
}

/// Fixed user (tests, embedding)
pub struct StaticUserProvider(pub String);

impl UserProvider for StaticUserProvider {
    fn current_user(&self) -> String {
        self.0.clone()
    }
}
