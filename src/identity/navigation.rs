/// Path of the login view.
pub const LOGIN_PATH: &str = "/auth/login";
/// Route name the session asks the navigator for on logout.
pub const LOGIN_VIEW: &str = "Login";
/// Where authenticated users land when a route turns them away.
pub const DASHBOARD_PATH: &str = "/dashboard";

/// External router the session can steer after logout.
pub trait Navigator: Send + Sync {
    /// Path of the view currently shown, if any view is active.
    fn current_path(&self) -> Option<String>;
    /// Transition to the named view.
    fn push(&self, view: &str);
}
