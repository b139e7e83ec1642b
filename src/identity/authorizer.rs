use super::navigation::{DASHBOARD_PATH, LOGIN_PATH};
use super::session::{SessionManager, SessionSnapshot};

/// Access flags a route carries. A route's effective meta is the union of its
/// own flags and those of every parent route it is nested under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteMeta {
    pub requires_auth: bool,
    /// Only reachable while anonymous (login, register).
    pub guest: bool,
    pub requires_admin: bool,
}

impl RouteMeta {
    pub fn public() -> Self { Self::default() }
    pub fn guest() -> Self { Self { guest: true, ..Self::default() } }
    pub fn authenticated() -> Self { Self { requires_auth: true, ..Self::default() } }
    pub fn admin() -> Self { Self { requires_auth: true, requires_admin: true, ..Self::default() } }

    /// Merge the flags of a matched route chain.
    pub fn merged<'a, I: IntoIterator<Item = &'a RouteMeta>>(chain: I) -> Self {
        chain.into_iter().fold(Self::default(), |acc, m| Self {
            requires_auth: acc.requires_auth || m.requires_auth,
            guest: acc.guest || m.guest,
            requires_admin: acc.requires_admin || m.requires_admin,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Redirect(&'static str),
}

/// Decide whether a navigation to a route with `meta` may proceed.
pub fn guard(meta: &RouteMeta, session: &SessionSnapshot) -> GuardDecision {
    let authenticated = session.is_authenticated();
    let is_admin = session.user.as_ref().map(|u| u.is_admin).unwrap_or(false);
    if meta.requires_auth && !authenticated {
        GuardDecision::Redirect(LOGIN_PATH)
    } else if meta.guest && authenticated {
        GuardDecision::Redirect(DASHBOARD_PATH)
    } else if meta.requires_admin && !is_admin {
        GuardDecision::Redirect(DASHBOARD_PATH)
    } else {
        GuardDecision::Proceed
    }
}

/// Navigation hook: make sure the session ran its startup check, then decide.
pub async fn guard_navigation(manager: &SessionManager, meta: &RouteMeta) -> GuardDecision {
    if !manager.is_initialized() {
        manager.initialize().await;
    }
    guard(meta, &manager.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserProfile;

    fn anon() -> SessionSnapshot { SessionSnapshot::default() }

    fn signed_in(admin: bool) -> SessionSnapshot {
        let mut user = UserProfile::new(1, "a@b.com");
        user.is_admin = admin;
        SessionSnapshot {
            user: Some(user),
            access_token: Some("AT1".into()),
            refresh_token: Some("RT1".into()),
            initialized: true,
            ..SessionSnapshot::default()
        }
    }

    #[test]
    fn anonymous_decisions() {
        assert_eq!(guard(&RouteMeta::authenticated(), &anon()), GuardDecision::Redirect(LOGIN_PATH));
        assert_eq!(guard(&RouteMeta::admin(), &anon()), GuardDecision::Redirect(LOGIN_PATH));
        assert_eq!(guard(&RouteMeta::guest(), &anon()), GuardDecision::Proceed);
        assert_eq!(guard(&RouteMeta::public(), &anon()), GuardDecision::Proceed);
    }

    #[test]
    fn authenticated_decisions() {
        let user = signed_in(false);
        assert_eq!(guard(&RouteMeta::authenticated(), &user), GuardDecision::Proceed);
        assert_eq!(guard(&RouteMeta::guest(), &user), GuardDecision::Redirect(DASHBOARD_PATH));
        assert_eq!(guard(&RouteMeta::admin(), &user), GuardDecision::Redirect(DASHBOARD_PATH));
        assert_eq!(guard(&RouteMeta::admin(), &signed_in(true)), GuardDecision::Proceed);
    }

    #[test]
    fn token_without_user_is_not_authenticated() {
        let snap = SessionSnapshot { access_token: Some("AT1".into()), ..SessionSnapshot::default() };
        assert_eq!(guard(&RouteMeta::authenticated(), &snap), GuardDecision::Redirect(LOGIN_PATH));
    }

    #[test]
    fn nested_meta_is_merged() {
        let chain = [RouteMeta::authenticated(), RouteMeta { requires_admin: true, ..RouteMeta::default() }];
        assert_eq!(RouteMeta::merged(chain.iter()), RouteMeta::admin());
        assert_eq!(RouteMeta::merged(std::iter::empty()), RouteMeta::public());
    }
}
