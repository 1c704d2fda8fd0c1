//! Target binding for the New Steps application.
//!
//! Every site-specific string lives here: selector candidates per semantic
//! field, endpoint expectations, paths, loading indicators, and the text
//! tokens used to classify outcomes. The rest of the crate only sees names.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::probe::Expect;

/// Interaction performed on the winning candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Fill,
    Click,
    SelectOption,
    Check,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Fill => "fill",
            Action::Click => "click",
            Action::SelectOption => "select_option",
            Action::Check => "check",
        }
    }
}

/// Ordered candidates for one semantic name. `{value}` in a candidate is
/// replaced by the value being entered.
#[derive(Debug, Clone)]
pub struct SelectorStrategy {
    pub name: &'static str,
    pub action: Action,
    pub candidates: Vec<&'static str>,
}

/// An endpoint and the statuses it may answer with
#[derive(Debug, Clone)]
pub struct EndpointCheck {
    pub path: &'static str,
    pub expect: Expect,
}

impl EndpointCheck {
    fn new(path: &'static str, expect: Expect) -> Self {
        Self { path, expect }
    }
}

pub mod paths {
    pub const HOME: &str = "/";
    pub const ABOUT: &str = "/about";
    pub const CONTACT: &str = "/contact";
    pub const DONATE: &str = "/donate";
    pub const DONATE_SHOES: &str = "/donate/shoes";
    pub const GET_INVOLVED: &str = "/get-involved";
    pub const VOLUNTEER: &str = "/volunteer";
    pub const LOGIN: &str = "/login";
    pub const REGISTER: &str = "/register";
    pub const ACCOUNT: &str = "/account";
    pub const SHOES: &str = "/shoes";
    pub const CART: &str = "/cart";
    pub const CHECKOUT: &str = "/checkout";
    pub const ADMIN: &str = "/admin";
    pub const ADMIN_ADD_SHOE: &str = "/admin/shoes/add";

    pub const API_HEALTH: &str = "/api/health";
    pub const API_SHOES: &str = "/api/shoes";
    pub const API_SETTINGS: &str = "/api/settings";
    pub const API_CONTACT: &str = "/api/contact";
    pub const API_DONATIONS: &str = "/api/donations";
    pub const API_MONEY_DONATIONS: &str = "/api/donations/money";
    pub const API_VOLUNTEERS: &str = "/api/volunteers";
    pub const API_REGISTER: &str = "/api/auth/register";
    pub const API_TEST_LOGIN: &str = "/api/auth/test-login";
    pub const API_REQUESTS: &str = "/api/requests";
    pub const API_PROFILE: &str = "/api/user/profile";
    pub const API_ADMIN_SHOES: &str = "/api/admin/shoes";
    pub const API_ADMIN_REQUESTS: &str = "/api/admin/requests";
    pub const API_ADMIN_DONATIONS: &str = "/api/admin/donations";
    pub const API_ADMIN_MONEY_DONATIONS: &str = "/api/admin/money-donations";
    pub const API_ADMIN_USERS: &str = "/api/admin/users";
    pub const API_ADMIN_ANALYTICS: &str = "/api/admin/analytics";
    pub const API_ADMIN_SETTINGS: &str = "/api/admin/settings";

    /// Per-item segment of a catalog detail page
    pub const SHOE_DETAIL_PREFIX: &str = "/shoes/";
}

/// The New Steps selector and endpoint registry
pub struct Registry {
    strategies: HashMap<&'static str, SelectorStrategy>,
    pub loading_indicators: Vec<&'static str>,
    pub catalog_items: &'static str,
    pub cart_rows: Vec<&'static str>,
    pub post_auth_markers: Vec<&'static str>,
    pub session_cookies: Vec<&'static str>,
    pub dashboard_markers: Vec<&'static str>,
    pub admin_surfaces: Vec<&'static str>,
    pub dropdown_options: Vec<&'static str>,
    pub submission_tokens: Vec<&'static str>,
    pub registration_tokens: Vec<&'static str>,
    pub inventory_tokens: Vec<&'static str>,
}

impl Registry {
    fn strategy(&mut self, name: &'static str, action: Action, candidates: &[&'static str]) {
        self.strategies.insert(
            name,
            SelectorStrategy {
                name,
                action,
                candidates: candidates.to_vec(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&SelectorStrategy> {
        self.strategies.get(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.strategies.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Add a loading indicator; returns false when it was already known
    pub fn add_indicator(&mut self, locator: &'static str) -> bool {
        if self.loading_indicators.contains(&locator) {
            return false;
        }
        self.loading_indicators.push(locator);
        true
    }

    pub fn new_steps() -> Self {
        let mut r = Registry {
            strategies: HashMap::new(),
            loading_indicators: Vec::new(),
            catalog_items: ".grid > div",
            cart_rows: vec![
                "[data-testid=\"cart-item\"]",
                ".cart-item",
                "ul li:has-text(\"Size\")",
            ],
            post_auth_markers: vec![
                "button:has-text(\"Logout\")",
                "button:has-text(\"Sign Out\")",
                "a:has-text(\"Logout\")",
                "a[href=\"/account\"]",
                "[data-testid=\"user-menu\"]",
                ".user-menu",
            ],
            session_cookies: vec![
                "next-auth.session-token",
                "__Secure-next-auth.session-token",
                "authjs.session-token",
                "__Secure-authjs.session-token",
            ],
            dashboard_markers: vec![
                "text=Dashboard",
                "text=Admin",
                "[data-testid=\"admin-nav\"]",
                ".admin-nav",
                ".admin-menu",
            ],
            admin_surfaces: vec![
                "shoes",
                "shoe-donations",
                "money-donations",
                "requests",
                "users",
                "settings",
                "analytics",
            ],
            dropdown_options: vec!["[role=\"option\"]", "[role=\"listbox\"] li"],
            submission_tokens: vec![
                "success",
                "thank you",
                "submitted",
                "received",
                "confirmation",
            ],
            registration_tokens: vec!["success", "registered", "verify"],
            inventory_tokens: vec!["added", "created", "success"],
        };

        for indicator in [
            ".animate-spin",
            "text=Loading",
            ".spinner",
            ".loading",
            "[aria-busy=\"true\"]",
            ".MuiCircularProgress-root",
            ".chakra-spinner",
        ] {
            r.add_indicator(indicator);
        }

        use Action::*;

        // Identity
        r.strategy("firstName", Fill, &[
            "input[name=\"firstName\"]",
            "#firstName",
            "input[name=\"first_name\"]",
            "input[placeholder*=\"First\" i]",
        ]);
        r.strategy("lastName", Fill, &[
            "input[name=\"lastName\"]",
            "#lastName",
            "input[name=\"last_name\"]",
            "input[placeholder*=\"Last\" i]",
        ]);
        r.strategy("email", Fill, &[
            "input[name=\"email\"]",
            "#email",
            "input[type=\"email\"]",
        ]);
        r.strategy("phone", Fill, &[
            "input[name=\"phone\"]",
            "#phone",
            "input[type=\"tel\"]",
        ]);
        r.strategy("password", Fill, &[
            "input[name=\"password\"]",
            "#password",
            "input[type=\"password\"] >> nth=0",
        ]);
        r.strategy("confirmPassword", Fill, &[
            "input[name=\"confirmPassword\"]",
            "#confirmPassword",
            "input[type=\"password\"] >> nth=1",
        ]);

        // Address
        r.strategy("street", Fill, &[
            "input[name=\"street\"]",
            "input[name=\"address.street\"]",
            "input[name=\"address\"]",
            "#street",
            "input[placeholder*=\"Street\" i]",
        ]);
        r.strategy("city", Fill, &[
            "input[name=\"city\"]",
            "input[name=\"address.city\"]",
            "#city",
        ]);
        r.strategy("state", Fill, &[
            "input[name=\"state\"]",
            "input[name=\"address.state\"]",
            "#state",
        ]);
        r.strategy("zipCode", Fill, &[
            "input[name=\"zipCode\"]",
            "input[name=\"address.zipCode\"]",
            "input[name=\"zip\"]",
            "#zipCode",
            "input[placeholder*=\"ZIP\" i]",
        ]);

        // Donations and messages
        r.strategy("numberOfShoes", Fill, &[
            "input[name=\"numberOfShoes\"]",
            "#numberOfShoes",
            "input[type=\"number\"] >> nth=0",
        ]);
        r.strategy("donationDescription", Fill, &[
            "textarea[name=\"donationDescription\"]",
            "textarea[name=\"description\"]",
            "#donationDescription",
            "textarea >> nth=0",
        ]);
        r.strategy("amount", Fill, &[
            "input[name=\"amount\"]",
            "#amount",
            "input[name=\"customAmount\"]",
            "input[type=\"number\"] >> nth=0",
        ]);
        r.strategy("message", Fill, &[
            "textarea[name=\"message\"]",
            "#message",
            "textarea >> nth=0",
        ]);
        r.strategy("subject", Fill, &[
            "input[name=\"subject\"]",
            "#subject",
        ]);
        r.strategy("pickup-option", Check, &[
            "input[name=\"pickupOption\"][value=\"{value}\"]",
            "input[name=\"shippingMethod\"][value=\"{value}\"]",
            "input[type=\"radio\"][value=\"{value}\"]",
            "label:has-text(\"{value}\")",
        ]);

        // Volunteer
        r.strategy("location", Fill, &[
            "input[name=\"location\"]",
            "#location",
            "input[placeholder*=\"City\" i]",
        ]);
        r.strategy("availability", SelectOption, &[
            "select[name=\"availability\"]",
            "#availability",
        ]);
        r.strategy("interests", Check, &[
            "input[name=\"interests\"][value=\"{value}\"]",
            "input[type=\"checkbox\"][value=\"{value}\"]",
            "input[type=\"checkbox\"] >> nth=0",
        ]);
        r.strategy("experience", Fill, &[
            "textarea[name=\"experience\"]",
            "#experience",
            "textarea >> nth=0",
        ]);

        // Inventory form
        r.strategy("modelName", Fill, &[
            "input[name=\"modelName\"]",
            "input[name=\"model\"]",
            "#modelName",
            "input[name=\"name\"]",
        ]);
        r.strategy("size", Fill, &[
            "input[name=\"size\"]",
            "#size",
        ]);
        r.strategy("color", Fill, &[
            "input[name=\"color\"]",
            "#color",
        ]);
        r.strategy("brand", SelectOption, &[
            "select[name=\"brand\"]",
            "#brand",
            "select >> nth=0",
        ]);
        r.strategy("gender", SelectOption, &[
            "select[name=\"gender\"]",
            "#gender",
            "select >> nth=1",
        ]);
        r.strategy("sport", SelectOption, &[
            "select[name=\"sport\"]",
            "#sport",
            "select >> nth=2",
        ]);
        r.strategy("condition", SelectOption, &[
            "select[name=\"condition\"]",
            "#condition",
            "select >> nth=3",
        ]);

        // Navigation and commit controls
        r.strategy("submit", Click, &[
            "button[type=\"submit\"]",
            "input[type=\"submit\"]",
            "button:has-text(\"Submit\")",
            "button:has-text(\"Send\")",
            "button:has-text(\"Sign In\")",
            "button:has-text(\"Login\")",
            "button:has-text(\"Register\")",
            "button:has-text(\"Create Account\")",
            "button:has-text(\"Place Request\")",
            "button:has-text(\"Donate\")",
        ]);
        r.strategy("add-to-cart", Click, &[
            "button:has-text(\"Request These Shoes\")",
            "button:has-text(\"Get These Free Shoes\")",
            "button:has-text(\"Add to Cart\")",
            "a:has-text(\"Request These Shoes\")",
            "a:has-text(\"Get These Free Shoes\")",
        ]);
        r.strategy("checkout", Click, &[
            "a[href=\"/checkout\"]",
            "button:has-text(\"Checkout\")",
            "a:has-text(\"Checkout\")",
        ]);
        r.strategy("first-item", Click, &[
            ".grid > div a[href^=\"/shoes/\"] >> nth=0",
            "a[href^=\"/shoes/\"] >> nth=0",
            ".grid > div >> nth=0",
        ]);

        r
    }

    /// L1: public pages, all expected to answer 200
    pub fn public_pages(&self) -> Vec<EndpointCheck> {
        [
            paths::HOME,
            paths::ABOUT,
            paths::CONTACT,
            paths::DONATE,
            paths::DONATE_SHOES,
            paths::GET_INVOLVED,
            paths::VOLUNTEER,
            paths::LOGIN,
            paths::REGISTER,
            paths::SHOES,
        ]
        .into_iter()
        .map(|p| EndpointCheck::new(p, Expect::Statuses(vec![200])))
        .collect()
    }

    /// L1: API surface with the statuses a healthy deployment may give
    /// an anonymous GET
    pub fn api_endpoints(&self) -> Vec<EndpointCheck> {
        let gated = || Expect::Statuses(vec![200, 401, 405]);
        vec![
            EndpointCheck::new(paths::API_HEALTH, Expect::Statuses(vec![200])),
            EndpointCheck::new(paths::API_SHOES, Expect::Statuses(vec![200])),
            EndpointCheck::new(paths::API_SETTINGS, Expect::Statuses(vec![200])),
            EndpointCheck::new(paths::API_CONTACT, Expect::Statuses(vec![200, 405])),
            EndpointCheck::new(paths::API_DONATIONS, gated()),
            EndpointCheck::new(paths::API_MONEY_DONATIONS, gated()),
            EndpointCheck::new(paths::API_VOLUNTEERS, gated()),
            EndpointCheck::new(paths::API_REQUESTS, gated()),
            EndpointCheck::new(paths::API_PROFILE, Expect::Statuses(vec![200, 401, 403])),
        ]
    }

    /// L4: admin APIs that must refuse anonymous callers
    pub fn protected_apis(&self) -> Vec<&'static str> {
        vec![
            paths::API_ADMIN_SHOES,
            paths::API_ADMIN_REQUESTS,
            paths::API_ADMIN_DONATIONS,
            paths::API_ADMIN_MONEY_DONATIONS,
            paths::API_ADMIN_USERS,
            paths::API_ADMIN_ANALYTICS,
            paths::API_ADMIN_SETTINGS,
        ]
    }

    pub fn admin_surface_path(surface: &str) -> String {
        format!("{}/{}", paths::ADMIN, surface)
    }
}

/// Shared registry, declared once
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new_steps);

pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Case-insensitive search for the first token present in `text`
pub fn find_token<'a>(text: &str, tokens: &[&'a str]) -> Option<&'a str> {
    let lower = text.to_lowercase();
    tokens.iter().copied().find(|t| lower.contains(&t.to_lowercase()))
}
