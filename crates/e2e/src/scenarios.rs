//! Built-in verification scenarios for the CMS admin panel and public site
//!
//! Every scenario is an independent, linear procedure. Those that save
//! content write literal values into the running application; run them
//! against an instance that tolerates repeated writes.

use crate::spec::{Condition, LoadState, Position, Scenario, Step, Viewport};

pub const BASE_URL: &str = "http://localhost:3001";
pub const LOGIN_PATH: &str = "/login.html";
pub const ADMIN_PATH: &str = "/admin.html";
pub const LOGOUT_PATH: &str = "/logout";

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "password";

pub const ADMIN_TITLE: &str = "Admin Panel - Content Management";
pub const SAVE_CONFIRMATION: &str = "Content updated successfully!";

pub const POPUP_TITLE: &str = "Special Offer!";
pub const POPUP_MESSAGE: &str = "Enjoy a complimentary breakfast for bookings made this week.";
pub const POPUP_IMAGE: &str =
    "https://rumahdaisycantik.com/wp-content/uploads/1_bedroom-2_August-15.jpeg";
pub const PARALLAX_IMAGE: &str = "https://images.unsplash.com/photo-1506748686214-e9df14d4d9d0";

const HIDE_POPUP_JS: &str =
    r#"document.getElementById("popup-modal")?.classList.add("hidden")"#;
const SHOW_POPUP_JS: &str =
    r#"document.getElementById("popup-modal").classList.remove("hidden")"#;

/// Admin credentials used by the login form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: ADMIN_USERNAME.to_string(),
            password: ADMIN_PASSWORD.to_string(),
        }
    }
}

/// All built-in scenarios, in a stable order
pub fn builtin(credentials: &Credentials) -> Vec<Scenario> {
    vec![
        login(credentials),
        content_save(credentials),
        popup_dismiss(),
        parallax(credentials),
        logout(credentials),
        button_links(credentials),
        accommodation_buttons(credentials),
        admin_cleanup(),
        page_snapshots(),
    ]
}

/// Look up a built-in scenario by name
pub fn find(name: &str, credentials: &Credentials) -> Option<Scenario> {
    builtin(credentials).into_iter().find(|s| s.name == name)
}

fn scenario(name: &str, description: &str, tags: &[&str], steps: Vec<Step>) -> Scenario {
    Scenario {
        name: name.to_string(),
        description: description.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        viewport: Viewport::default(),
        steps,
        visual_regression: false,
        visual_threshold: None,
    }
}

fn navigate(url: &str) -> Step {
    Step::Navigate {
        url: url.to_string(),
        wait_until: LoadState::Load,
    }
}

fn navigate_idle(url: &str) -> Step {
    Step::Navigate {
        url: url.to_string(),
        wait_until: LoadState::NetworkIdle,
    }
}

fn fill(selector: &str, value: &str) -> Step {
    Step::Fill {
        selector: selector.to_string(),
        value: value.to_string(),
    }
}

fn click(selector: &str) -> Step {
    Step::Click {
        selector: selector.to_string(),
        position: None,
    }
}

fn expect(selector: &str, condition: Condition) -> Step {
    Step::Expect {
        selector: selector.to_string(),
        expect: condition,
    }
}

fn text(value: &str) -> Condition {
    Condition::Text {
        text: value.to_string(),
    }
}

fn attribute(name: &str, value: &str) -> Condition {
    Condition::Attribute {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn expect_url(url: &str) -> Step {
    Step::ExpectUrl { url: url.to_string() }
}

fn evaluate(script: &str) -> Step {
    Step::Evaluate {
        script: script.to_string(),
    }
}

fn screenshot(name: &str) -> Step {
    Step::Screenshot {
        name: name.to_string(),
        full_page: true,
    }
}

/// Submit the login form and wait for the admin page
fn sign_in(credentials: &Credentials) -> Vec<Step> {
    vec![
        navigate(LOGIN_PATH),
        fill("#username", &credentials.username),
        fill("#password", &credentials.password),
        click(r#"button[type="submit"]"#),
        Step::WaitForUrl {
            url: ADMIN_PATH.to_string(),
        },
        expect_url(ADMIN_PATH),
    ]
}

/// Click save and wait for the confirmation text
fn save_all(confirmation: Condition) -> Vec<Step> {
    vec![click("#save-all-btn"), expect("#save-message", confirmation)]
}

/// Unauthenticated access redirects to login; valid credentials reach the admin page
pub fn login(credentials: &Credentials) -> Scenario {
    let mut steps = vec![
        navigate(ADMIN_PATH),
        expect_url(LOGIN_PATH),
        expect("#login-form", Condition::Visible),
        screenshot("01_login_page"),
    ];
    steps.extend(sign_in(credentials));
    steps.extend([
        Step::ExpectTitle {
            title: ADMIN_TITLE.to_string(),
        },
        screenshot("02_admin_panel"),
    ]);

    scenario(
        "login",
        "Redirect to login when unauthenticated, then sign in",
        &["auth", "smoke"],
        steps,
    )
}

/// Saved popup content shows up on the public page
pub fn content_save(credentials: &Credentials) -> Scenario {
    let mut steps = sign_in(credentials);
    steps.extend([
        Step::Check {
            selector: "#popup-enabled".to_string(),
        },
        fill("#popup-title", POPUP_TITLE),
        fill("#popup-message", POPUP_MESSAGE),
        fill("#popup-image", POPUP_IMAGE),
        fill("#parallax-bg", PARALLAX_IMAGE),
    ]);
    steps.extend(save_all(text(SAVE_CONFIRMATION)));
    steps.extend([
        screenshot("01_admin_saved"),
        navigate("/"),
        expect("#popup-modal", Condition::Visible),
        expect("#popup-title", text(POPUP_TITLE)),
        expect("#popup-image", attribute("src", POPUP_IMAGE)),
        screenshot("02_index_with_popup"),
    ]);

    scenario(
        "content_save",
        "Edit popup content in the admin panel and verify it on the public page",
        &["content"],
        steps,
    )
}

/// Popup hides via its close button and via a click on the overlay
pub fn popup_dismiss() -> Scenario {
    scenario(
        "popup_dismiss",
        "Dismiss the popup with the close button and by clicking outside it",
        &["popup", "smoke"],
        vec![
            navigate("/"),
            expect("#popup-modal", Condition::Visible),
            screenshot("01_popup_visible"),
            click("#close-popup-btn"),
            expect("#popup-modal", Condition::Hidden),
            screenshot("02_popup_hidden_after_x"),
            evaluate(SHOW_POPUP_JS),
            expect("#popup-modal", Condition::Visible),
            Step::Click {
                selector: "#popup-modal".to_string(),
                position: Some(Position { x: 10.0, y: 10.0 }),
            },
            expect("#popup-modal", Condition::Hidden),
            screenshot("03_popup_hidden_after_overlay_click"),
        ],
    )
}

/// Saved background URL is applied as the parallax element's computed style
pub fn parallax(credentials: &Credentials) -> Scenario {
    let mut steps = sign_in(credentials);
    steps.push(fill("#parallax-bg", PARALLAX_IMAGE));
    steps.extend(save_all(text(SAVE_CONFIRMATION)));
    steps.extend([
        navigate("/"),
        evaluate(HIDE_POPUP_JS),
        expect(
            ".parallax-bg",
            Condition::Css {
                property: "background-image".to_string(),
                value: format!(r#"url("{}")"#, PARALLAX_IMAGE),
            },
        ),
        screenshot("01_index_with_parallax"),
    ]);

    scenario(
        "parallax",
        "Save a parallax background and check the computed background-image",
        &["content", "style"],
        steps,
    )
}

/// Logging out ends the session
pub fn logout(credentials: &Credentials) -> Scenario {
    let mut steps = sign_in(credentials);
    steps.extend([
        navigate(LOGOUT_PATH),
        Step::WaitForUrl {
            url: LOGIN_PATH.to_string(),
        },
        expect("#login-form", Condition::Visible),
        navigate(ADMIN_PATH),
        expect_url(LOGIN_PATH),
        screenshot("01_login_after_logout"),
    ]);

    scenario(
        "logout",
        "Log out and verify the admin page is no longer reachable",
        &["auth"],
        steps,
    )
}

pub const CTA_TEXT: &str = "Reserve Now!";
pub const CTA_LINK: &str = "https://new-booking-link.com/";

/// Edited call-to-action button text and link appear on the public page
pub fn button_links(credentials: &Credentials) -> Scenario {
    let mut steps = sign_in(credentials);
    steps.extend([
        screenshot("01_admin_before_edit"),
        fill("#btn-text-0", CTA_TEXT),
        fill("#btn-link-0", CTA_LINK),
        screenshot("02_admin_during_edit"),
    ]);
    steps.extend(save_all(Condition::ContainsText {
        text: SAVE_CONFIRMATION.to_string(),
    }));
    steps.extend([
        screenshot("03_admin_after_save"),
        navigate("/"),
        expect("#cta-book-now", text(CTA_TEXT)),
        expect("#cta-book-now", attribute("href", CTA_LINK)),
        screenshot("04_website_with_updated_button"),
    ]);

    scenario(
        "button_links",
        "Update the Book Now button text and link",
        &["content", "buttons"],
        steps,
    )
}

pub const PACKAGE_BUTTON_TEXT: &str = "Book This Villa";
pub const PACKAGE_BUTTON_LINK: &str = "https://booking.com/villa-1";

/// Edited accommodation package button appears on the first package card
pub fn accommodation_buttons(credentials: &Credentials) -> Scenario {
    const FIRST_PACKAGE_LINK: &str = "#accommodations-container a";

    let mut steps = sign_in(credentials);
    steps.extend([
        screenshot("01_admin_before_edit"),
        fill("#pkg-btn-text-0", PACKAGE_BUTTON_TEXT),
        fill("#pkg-btn-link-0", PACKAGE_BUTTON_LINK),
        screenshot("02_admin_during_edit"),
    ]);
    steps.extend(save_all(Condition::ContainsText {
        text: SAVE_CONFIRMATION.to_string(),
    }));
    steps.extend([
        screenshot("03_admin_after_save"),
        navigate("/"),
        expect(
            FIRST_PACKAGE_LINK,
            Condition::ContainsText {
                text: PACKAGE_BUTTON_TEXT.to_string(),
            },
        ),
        expect(FIRST_PACKAGE_LINK, attribute("href", PACKAGE_BUTTON_LINK)),
        screenshot("04_website_with_updated_button"),
    ]);

    scenario(
        "accommodation_buttons",
        "Update the first accommodation package button text and link",
        &["content", "buttons"],
        steps,
    )
}

/// No obsolete villa images remain on the admin page
pub fn admin_cleanup() -> Scenario {
    scenario(
        "admin_cleanup",
        "Admin page and public site render without obsolete villa images",
        &["content"],
        vec![
            navigate_idle(ADMIN_PATH),
            screenshot("01_admin_panel"),
            expect("text=villa-", Condition::Count { count: 0 }),
            navigate("/"),
            screenshot("02_main_site"),
        ],
    )
}

/// Capture the public and admin pages once the network is idle
pub fn page_snapshots() -> Scenario {
    scenario(
        "page_snapshots",
        "Full-page captures of the public and admin pages",
        &["smoke"],
        vec![
            navigate_idle("/index.html"),
            screenshot("01_index"),
            navigate_idle(ADMIN_PATH),
            screenshot("02_admin"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_are_unique_and_valid() {
        let scenarios = builtin(&Credentials::default());
        let mut names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), scenarios.len());

        for scenario in &scenarios {
            scenario.validate().unwrap();
        }
    }

    #[test]
    fn test_find_by_name() {
        let creds = Credentials::default();
        assert!(find("popup_dismiss", &creds).is_some());
        assert!(find("does_not_exist", &creds).is_none());
    }

    #[test]
    fn test_sign_in_uses_credentials() {
        let creds = Credentials {
            username: "editor".to_string(),
            password: "s3cret".to_string(),
        };
        let steps = sign_in(&creds);
        assert!(steps.contains(&fill("#username", "editor")));
        assert!(steps.contains(&fill("#password", "s3cret")));
        assert_eq!(steps.last(), Some(&expect_url(ADMIN_PATH)));
    }
}
