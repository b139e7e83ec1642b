//! Client-side identity: the session manager and the collaborators it talks to.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
mod navigation;
mod authorizer;

pub use principal::UserProfile;
pub use session::{AuthStatus, SessionManager, SessionSnapshot};
pub use provider::{AuthApi, LoginRequest, PasswordChange, RegisterRequest, TokenResponse, TwoFactorSetup};
pub use navigation::{Navigator, DASHBOARD_PATH, LOGIN_PATH, LOGIN_VIEW};
pub use authorizer::{guard, guard_navigation, GuardDecision, RouteMeta};
