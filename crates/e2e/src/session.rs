//! Session establishment for users and administrators, in the browser and
//! over the API

use chrono::Utc;
use newsteps_qa_common::{details, CheckRecord, Credentials, HarnessConfig};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::browser::{url_path, Locator, Page};
use crate::error::{HarnessError, HarnessResult};
use crate::probe::{Expect, HttpProbe, ProbeRecord};
use crate::registry::{find_token, paths, Registry};
use crate::selectors::SelectorResolver;
use crate::wait::DynamicWaitPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

/// Result of a session protocol run
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub success: bool,
    pub credentials: Option<Credentials>,
    pub checks: Vec<CheckRecord>,
}

/// Signals that a registration went through
///
/// Success text only counts when it appeared after the submit; `before` is
/// the page body as it was before submitting.
pub fn registration_signals(
    final_url: &str,
    before: &str,
    body: &str,
    registry: &Registry,
) -> Vec<&'static str> {
    let path = url_path(final_url);
    let mut signals = Vec::new();
    if !path.contains(paths::REGISTER) {
        signals.push("left_registration");
    }
    if path.starts_with(paths::LOGIN) {
        signals.push("redirected_to_login");
    }
    let fresh: Vec<&str> = registry
        .registration_tokens
        .iter()
        .copied()
        .filter(|t| find_token(before, &[*t]).is_none())
        .collect();
    if find_token(body, &fresh).is_some() {
        signals.push("success_text");
    }
    signals
}

/// Signals that a login established a session
pub fn login_signals(
    final_url: &str,
    marker: Option<&str>,
    cookies: &[String],
    registry: &Registry,
) -> Vec<&'static str> {
    let mut signals = Vec::new();
    if url_path(final_url) != paths::LOGIN {
        signals.push("left_login");
    }
    if marker.is_some() {
        signals.push("post_auth_marker");
    }
    if cookies
        .iter()
        .any(|c| registry.session_cookies.contains(&c.as_str()))
    {
        signals.push("session_cookie");
    }
    signals
}

pub struct SessionManager<'a> {
    config: &'a HarnessConfig,
    registry: &'static Registry,
    resolver: SelectorResolver<'static>,
    waiter: DynamicWaitPolicy,
}

impl<'a> SessionManager<'a> {
    pub fn new(config: &'a HarnessConfig, registry: &'static Registry) -> Self {
        Self {
            config,
            registry,
            resolver: SelectorResolver::new(registry, config.timeouts.element()),
            waiter: DynamicWaitPolicy::from_config(&config.timeouts, registry),
        }
    }

    /// Fresh credentials keyed on the current epoch second
    pub fn mint(&self) -> Credentials {
        Credentials::mint(
            &self.config.user.email_prefix,
            &self.config.user.password,
            Utc::now().timestamp(),
        )
    }

    pub fn admin_credentials(&self) -> HarnessResult<Credentials> {
        self.config
            .admin
            .credentials()
            .map(|(email, password)| Credentials::fixed(email, password))
            .ok_or(HarnessError::MissingAdminCredentials)
    }

    async fn open(&self, page: &dyn Page, path: &str) -> HarnessResult<()> {
        page.goto(&self.config.url(path), self.config.timeouts.navigation())
            .await?;
        self.waiter.settle(page).await;
        Ok(())
    }

    async fn submit(&self, page: &dyn Page) -> HarnessResult<()> {
        self.resolver.resolve(page, "submit", "").await?.require()?;
        self.waiter.settle(page).await;
        Ok(())
    }

    /// Open the registration page, fill and submit it, then classify
    pub async fn register(&self, page: &dyn Page, creds: &Credentials) -> HarnessResult<CheckRecord> {
        self.open(page, paths::REGISTER).await?;

        let fields = [
            ("firstName", creds.first_name.clone()),
            ("lastName", creds.last_name.clone()),
            ("email", creds.email.clone()),
            ("phone", creds.phone.clone()),
            ("password", creds.password.clone()),
            ("confirmPassword", creds.password.clone()),
        ];
        let resolutions = self.resolver.fill_all(page, &fields).await?;
        let missing: Vec<&str> = resolutions
            .iter()
            .filter(|r| !r.resolved())
            .map(|r| r.name.as_str())
            .collect();
        if missing.iter().any(|m| *m == "email" || *m == "password") {
            return Ok(CheckRecord::fail(
                "register",
                format!("element not found: {}", missing.join(", ")),
                details! { "email" => creds.email, "missing" => missing },
            ));
        }

        let before = page.body_text().await.unwrap_or_default();
        self.submit(page).await?;

        let url = page.url().await?;
        let body = page.body_text().await.unwrap_or_default();
        let signals = registration_signals(&url, &before, &body, self.registry);
        let details = details! {
            "email" => creds.email,
            "url" => url,
            "signals" => signals,
            "missing" => missing,
        };
        if signals.is_empty() {
            warn!("Registration for {} showed no success signal", creds.email);
            Ok(CheckRecord::fail("register", "no registration success signal", details))
        } else {
            info!("Registered {} ({})", creds.email, signals.join(", "));
            Ok(CheckRecord::pass("register", details))
        }
    }

    /// Open the login page, submit credentials, then classify
    pub async fn login(&self, page: &dyn Page, creds: &Credentials) -> HarnessResult<CheckRecord> {
        self.open(page, paths::LOGIN).await?;

        for (name, value) in [("email", &creds.email), ("password", &creds.password)] {
            self.resolver.resolve(page, name, value).await?.require()?;
        }
        self.submit(page).await?;

        let url = page.url().await?;
        let mut marker = None;
        for candidate in &self.registry.post_auth_markers {
            let loc = Locator::parse(candidate)?;
            if page.count(&loc).await.unwrap_or(0) > 0 {
                marker = Some(*candidate);
                break;
            }
        }
        let cookies = page.cookie_names().await.unwrap_or_default();
        let signals = login_signals(&url, marker, &cookies, self.registry);

        let details = details! {
            "email" => creds.email,
            "url" => url,
            "signals" => signals,
        };
        if signals.is_empty() {
            warn!("Login for {} showed no session signal", creds.email);
            Ok(CheckRecord::fail(
                "login",
                HarnessError::Authentication(format!("no session signal for {}", creds.email)),
                details,
            ))
        } else {
            info!("Logged in as {} ({})", creds.email, signals.join(", "));
            Ok(CheckRecord::pass("login", details))
        }
    }

    /// The account surface must not bounce back to login
    pub async fn revalidate(&self, page: &dyn Page) -> HarnessResult<CheckRecord> {
        self.open(page, paths::ACCOUNT).await?;
        let url = page.url().await?;
        let path = url_path(&url).to_string();
        if path.starts_with(paths::LOGIN) {
            Ok(CheckRecord::fail(
                "revalidate",
                "account surface redirected to login",
                details! { "url" => url },
            ))
        } else {
            Ok(CheckRecord::pass("revalidate", details! { "url" => url }))
        }
    }

    /// Run the protocol for `role`; `Admin` skips registration
    pub async fn establish(&self, page: &dyn Page, role: Role) -> HarnessResult<SessionOutcome> {
        let mut checks = Vec::new();
        let creds = match role {
            Role::User => {
                let creds = self.mint();
                checks.push(self.register(page, &creds).await?);
                creds
            }
            Role::Admin => self.admin_credentials()?,
        };
        let login = self.login(page, &creds).await?;
        let success = login.success;
        checks.push(login);
        Ok(SessionOutcome {
            success,
            credentials: success.then_some(creds),
            checks,
        })
    }
}

/// Register through the API on `probe`'s cookie jar
pub async fn api_register(probe: &HttpProbe, creds: &Credentials) -> ProbeRecord {
    let body = json!({
        "firstName": creds.first_name,
        "lastName": creds.last_name,
        "email": creds.email,
        "phone": creds.phone,
        "password": creds.password,
        "confirmPassword": creds.password,
    });
    probe.post(paths::API_REGISTER, body, Expect::Functional).await
}

/// Log in through the test-login endpoint; returns the reported role
pub async fn api_login(probe: &HttpProbe, creds: &Credentials) -> HarnessResult<String> {
    let record = probe
        .post(
            paths::API_TEST_LOGIN,
            json!({ "email": creds.email, "password": creds.password }),
            Expect::Functional,
        )
        .await;
    if !record.success {
        let reason = record
            .error
            .clone()
            .unwrap_or_else(|| format!("status {}", record.status));
        return Err(HarnessError::Authentication(format!(
            "{} via {}: {}",
            creds.email,
            paths::API_TEST_LOGIN,
            reason
        )));
    }
    let role = record
        .data
        .pointer("/user/role")
        .and_then(Value::as_str)
        .unwrap_or("user")
        .to_string();
    info!("API session for {} (role {})", creds.email, role);
    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{Effect, FakeElement, FakePage, FakeRoute};
    use crate::registry::registry;

    fn quick_config() -> HarnessConfig {
        let mut config = HarnessConfig::default();
        config.timeouts.stabilization_ms = 0;
        config.timeouts.element_secs = 0;
        config
    }

    fn site() -> FakePage {
        FakePage::new()
            .route(
                "/register",
                FakeRoute::new("Create your account")
                    .element("input[name=\"firstName\"]", FakeElement::input())
                    .element("input[name=\"lastName\"]", FakeElement::input())
                    .element("input[name=\"email\"]", FakeElement::input())
                    .element("input[name=\"phone\"]", FakeElement::input())
                    .element("input[name=\"password\"]", FakeElement::input())
                    .element("input[name=\"confirmPassword\"]", FakeElement::input())
                    .element(
                        "button[type=\"submit\"]",
                        FakeElement::button().on_click(Effect::Navigate("/login".into())),
                    ),
            )
            .route(
                "/login",
                FakeRoute::new("Sign in")
                    .element("input[name=\"email\"]", FakeElement::input())
                    .element("input[name=\"password\"]", FakeElement::input())
                    .element(
                        "button[type=\"submit\"]",
                        FakeElement::button()
                            .on_click(Effect::SetCookie("next-auth.session-token".into()))
                            .on_click(Effect::Navigate("/account".into())),
                    ),
            )
            .route("/account", FakeRoute::new("My Account"))
    }

    #[test]
    fn test_registration_signals() {
        let r = registry();
        assert_eq!(
            registration_signals("http://x/login?registered=1", "Create account", "", r),
            vec!["left_registration", "redirected_to_login"]
        );
        assert_eq!(
            registration_signals("http://x/register", "Create account", "Please verify your email", r),
            vec!["success_text"]
        );
        assert!(registration_signals("http://x/register", "", "Email already in use", r).is_empty());
    }

    #[test]
    fn test_static_page_text_is_not_a_registration_signal() {
        let r = registry();
        let form = "Create account. Registered users sign in here. We verify every donor.";
        assert!(registration_signals("http://x/register", form, form, r).is_empty());
        assert_eq!(
            registration_signals("http://x/register", form, &format!("{} Success!", form), r),
            vec!["success_text"]
        );
    }

    #[test]
    fn test_login_signals_are_orthogonal() {
        let r = registry();
        assert_eq!(login_signals("http://x/", None, &[], r), vec!["left_login"]);
        assert_eq!(
            login_signals("http://x/login", None, &["next-auth.session-token".into()], r),
            vec!["session_cookie"]
        );
        assert_eq!(
            login_signals("http://x/login", Some(".user-menu"), &[], r),
            vec!["post_auth_marker"]
        );
        assert!(login_signals("http://x/login", None, &["csrf".into()], r).is_empty());
    }

    #[tokio::test]
    async fn test_user_protocol_end_to_end() {
        let config = quick_config();
        let sessions = SessionManager::new(&config, registry());
        let page = site();

        let outcome = sessions.establish(&page, Role::User).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.checks.len(), 2);
        assert!(outcome.checks.iter().all(|c| c.success));
        let creds = outcome.credentials.unwrap();
        assert!(creds.email.starts_with("testuser_"));
        assert!(creds.email.ends_with("@example.com"));
        assert_eq!(page.current_path(), "/account");

        let again = sessions.revalidate(&page).await.unwrap();
        assert!(again.success);
    }

    #[tokio::test]
    async fn test_failed_login_is_authentication_failure() {
        let config = quick_config();
        let sessions = SessionManager::new(&config, registry());
        let page = FakePage::new().route(
            "/login",
            FakeRoute::new("Invalid credentials")
                .element("input[name=\"email\"]", FakeElement::input())
                .element("input[name=\"password\"]", FakeElement::input())
                .element("button[type=\"submit\"]", FakeElement::button()),
        );
        let creds = Credentials::fixed("admin@newsteps.test", "wrong");
        let check = sessions.login(&page, &creds).await.unwrap();
        assert!(!check.success);
        assert!(check.error().unwrap().starts_with("authentication failed"));
    }

    #[tokio::test]
    async fn test_admin_without_credentials() {
        let config = quick_config();
        let sessions = SessionManager::new(&config, registry());
        let page = site();
        let err = sessions.establish(&page, Role::Admin).await.unwrap_err();
        assert!(matches!(err, HarnessError::MissingAdminCredentials));
    }

    #[tokio::test]
    async fn test_revalidate_bounced_to_login() {
        let config = quick_config();
        let sessions = SessionManager::new(&config, registry());
        let page = FakePage::new()
            .route("/account", FakeRoute::default().redirect("/login"))
            .route("/login", FakeRoute::new("Sign in"));
        let check = sessions.revalidate(&page).await.unwrap();
        assert!(!check.success);
    }
}
