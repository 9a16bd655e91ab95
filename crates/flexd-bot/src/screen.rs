//! Screen interpretation for the Flex app
//!
//! Classifies a flattened page-source snapshot into one of four screen
//! states by looking for well-known resource ids. Interpretation is total:
//! any snapshot, including an empty or foreign one, maps to a state.

use flexd_core::{OfferDetails, Point};
use flexd_driver::UiElement;

use crate::config::{BotConfig, FilterSettings};

/// Sign-in button on the login screen.
const SIGN_IN_BUTTON_ID: &str = "com.amazon.flex.rabbit:id/sign_in_button";

/// Fields of the Amazon web-login form the app hands off to after the
/// sign-in button. These carry bare ids, not app-prefixed ones.
const WEB_LOGIN_IDS: [&str; 3] = ["ap_email", "ap_password", "signInSubmit"];

/// One offer row in the block list.
const BLOCK_ROW_ID: &str = "com.amazon.flex.rabbit:id/block_item_layout";

/// Pay text inside an offer row, e.g. `"$27.50"`.
const BLOCK_RATE_ID: &str = "com.amazon.flex.rabbit:id/block_rate";

/// Length text inside an offer row, e.g. `"120 min"`.
const BLOCK_DURATION_ID: &str = "com.amazon.flex.rabbit:id/block_duration";

/// Pickup location text inside an offer row, when the layout carries one.
const BLOCK_LOCATION_ID: &str = "com.amazon.flex.rabbit:id/block_location";

/// Accept confirmation button shown after tapping an offer.
const CONFIRM_BUTTON_ID: &str = "com.amazon.flex.rabbit:id/confirm_button";

/// Resource ids under this prefix belong to the Flex app.
const FLEX_ID_PREFIX: &str = "com.amazon.flex.rabbit:id/";

/// How much visible text an unrecognized-screen summary keeps.
const SUMMARY_MAX_LEN: usize = 120;

/// What the foreground screen shows.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenState {
    /// Login screen: the app wants credentials.
    LoggedOut,

    /// The block list with at least one offer row. Carries the first row
    /// in document order; later rows wait for the next snapshot.
    Offer(OfferDetails),

    /// Inside the app with no offer rows visible.
    Idle,

    /// A screen the interpreter doesn't recognize (system dialog, update
    /// prompt). Carries a text summary for the logs.
    UnknownDialog(String),
}

impl ScreenState {
    pub fn label(&self) -> &'static str {
        match self {
            ScreenState::LoggedOut => "logged-out",
            ScreenState::Offer(_) => "offer",
            ScreenState::Idle => "idle",
            ScreenState::UnknownDialog(_) => "unknown-dialog",
        }
    }
}

/// Classifies a snapshot.
///
/// The login screen wins over everything else; an offer row wins over
/// idle. A snapshot with Flex app ids but no offers is idle, and anything
/// without Flex ids at all is an unrecognized dialog.
pub fn interpret(elements: &[UiElement]) -> ScreenState {
    if elements.iter().any(is_login_anchor) {
        return ScreenState::LoggedOut;
    }
    if let Some(offer) = first_offer(elements) {
        return ScreenState::Offer(offer);
    }
    if elements
        .iter()
        .any(|el| el.resource_id.starts_with(FLEX_ID_PREFIX))
    {
        return ScreenState::Idle;
    }
    ScreenState::UnknownDialog(screen_summary(elements))
}

/// Whether an element marks a login screen: the app's own sign-in button
/// or one of the web-login form fields.
fn is_login_anchor(el: &UiElement) -> bool {
    el.resource_id == SIGN_IN_BUTTON_ID || WEB_LOGIN_IDS.contains(&el.resource_id.as_str())
}

/// Tap target of the accept confirmation button, when one is on screen.
pub fn confirm_target(elements: &[UiElement]) -> Option<Point> {
    elements
        .iter()
        .find(|el| el.resource_id == CONFIRM_BUTTON_ID)
        .and_then(UiElement::center)
}

/// Whether an offer clears the run's rate floor and the duration band.
///
/// An offer with no readable rate never qualifies; one with no readable
/// duration is judged on rate alone.
pub fn offer_qualifies(offer: &OfferDetails, config: &BotConfig, filter: &FilterSettings) -> bool {
    let Some(rate) = offer.rate else {
        return false;
    };
    rate >= config.min_rate && filter.duration_ok(offer.duration_mins)
}

/// Extracts the first offer row in document order.
///
/// A row's child nodes follow it in the flattened snapshot, so the rate,
/// duration, and location texts are picked up between this row and the
/// next one. Extraction is best-effort: unreadable fields stay `None`.
fn first_offer(elements: &[UiElement]) -> Option<OfferDetails> {
    let row = elements
        .iter()
        .position(|el| el.resource_id == BLOCK_ROW_ID)?;
    let end = elements[row + 1..]
        .iter()
        .position(|el| el.resource_id == BLOCK_ROW_ID)
        .map(|offset| row + 1 + offset)
        .unwrap_or(elements.len());

    let mut details = OfferDetails {
        tap: elements[row].center(),
        ..OfferDetails::default()
    };
    for el in &elements[row + 1..end] {
        match el.resource_id.as_str() {
            BLOCK_RATE_ID if details.rate.is_none() => details.rate = parse_rate(&el.text),
            BLOCK_DURATION_ID if details.duration_mins.is_none() => {
                details.duration_mins = parse_duration(&el.text)
            }
            BLOCK_LOCATION_ID if details.location.is_none() => {
                let text = el.text.trim();
                if !text.is_empty() {
                    details.location = Some(text.to_string());
                }
            }
            _ => {}
        }
    }
    Some(details)
}

/// Parses pay text like `"$27.50"` into dollars.
fn parse_rate(text: &str) -> Option<f64> {
    text.replace('$', "").trim().parse().ok()
}

/// Parses length text like `"120 min"` into minutes.
fn parse_duration(text: &str) -> Option<u32> {
    text.replace("min", "").trim().parse().ok()
}

/// Visible text of an unrecognized screen, for logging.
fn screen_summary(elements: &[UiElement]) -> String {
    let mut summary = String::new();
    for el in elements {
        let text = el.text.trim();
        if text.is_empty() {
            continue;
        }
        if !summary.is_empty() {
            summary.push_str(" | ");
        }
        summary.push_str(text);
        if summary.len() >= SUMMARY_MAX_LEN {
            summary.truncate(SUMMARY_MAX_LEN);
            break;
        }
    }
    if summary.is_empty() {
        summary = format!("{} elements, no readable text", elements.len());
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HoursWindow;
    use flexd_driver::parse_ui_tree;

    const LOGIN_SCREEN: &str = r#"<hierarchy rotation="0">
  <android.widget.FrameLayout class="android.widget.FrameLayout" resource-id="" bounds="[0,0][1080,1920]">
    <android.widget.TextView class="android.widget.TextView" text="Deliver packages. Earn money." resource-id="" bounds="[100,400][980,500]" />
    <android.widget.Button class="android.widget.Button" text="Sign in" resource-id="com.amazon.flex.rabbit:id/sign_in_button" bounds="[140,900][940,1020]" />
  </android.widget.FrameLayout>
</hierarchy>"#;

    const OFFER_SCREEN: &str = r#"<hierarchy rotation="0">
  <android.widget.FrameLayout class="android.widget.FrameLayout" resource-id="" bounds="[0,0][1080,1920]">
    <android.view.ViewGroup class="android.view.ViewGroup" resource-id="com.amazon.flex.rabbit:id/block_item_layout" bounds="[40,300][1040,520]">
      <android.widget.TextView class="android.widget.TextView" text="$21.50" resource-id="com.amazon.flex.rabbit:id/block_rate" bounds="[60,320][400,380]" />
      <android.widget.TextView class="android.widget.TextView" text="120 min" resource-id="com.amazon.flex.rabbit:id/block_duration" bounds="[60,400][400,460]" />
      <android.widget.TextView class="android.widget.TextView" text="DSD8 - Houston" resource-id="com.amazon.flex.rabbit:id/block_location" bounds="[60,460][400,510]" />
    </android.view.ViewGroup>
    <android.view.ViewGroup class="android.view.ViewGroup" resource-id="com.amazon.flex.rabbit:id/block_item_layout" bounds="[40,540][1040,760]">
      <android.widget.TextView class="android.widget.TextView" text="$30.00" resource-id="com.amazon.flex.rabbit:id/block_rate" bounds="[60,560][400,620]" />
      <android.widget.TextView class="android.widget.TextView" text="180 min" resource-id="com.amazon.flex.rabbit:id/block_duration" bounds="[60,640][400,700]" />
    </android.view.ViewGroup>
  </android.widget.FrameLayout>
</hierarchy>"#;

    const IDLE_SCREEN: &str = r#"<hierarchy rotation="0">
  <android.widget.FrameLayout class="android.widget.FrameLayout" resource-id="" bounds="[0,0][1080,1920]">
    <android.widget.TextView class="android.widget.TextView" text="No offers available" resource-id="com.amazon.flex.rabbit:id/empty_state_text" bounds="[100,800][980,900]" />
  </android.widget.FrameLayout>
</hierarchy>"#;

    const SYSTEM_DIALOG: &str = r#"<hierarchy rotation="0">
  <android.widget.FrameLayout class="android.widget.FrameLayout" resource-id="" bounds="[0,0][1080,1920]">
    <android.widget.TextView class="android.widget.TextView" text="System update available" resource-id="android:id/alertTitle" bounds="[100,700][980,800]" />
    <android.widget.Button class="android.widget.Button" text="Later" resource-id="android:id/button2" bounds="[100,900][500,1000]" />
  </android.widget.FrameLayout>
</hierarchy>"#;

    const CONFIRM_SCREEN: &str = r#"<hierarchy rotation="0">
  <android.widget.FrameLayout class="android.widget.FrameLayout" resource-id="" bounds="[0,0][1080,1920]">
    <android.widget.TextView class="android.widget.TextView" text="Schedule this block?" resource-id="com.amazon.flex.rabbit:id/confirm_title" bounds="[100,700][980,800]" />
    <android.widget.Button class="android.widget.Button" text="Schedule" resource-id="com.amazon.flex.rabbit:id/confirm_button" bounds="[140,900][940,1020]" />
  </android.widget.FrameLayout>
</hierarchy>"#;

    fn config_with_min_rate(min_rate: f64) -> BotConfig {
        BotConfig {
            days: vec!["Monday".to_string()],
            hours: HoursWindow {
                start: "08:00".to_string(),
                end: "18:00".to_string(),
            },
            min_rate,
            warehouse: "DSD8".to_string(),
        }
    }

    // ── Classification ──────────────────────────────────────

    #[test]
    fn test_login_screen_is_logged_out() {
        let state = interpret(&parse_ui_tree(LOGIN_SCREEN));
        assert_eq!(state, ScreenState::LoggedOut);
        assert_eq!(state.label(), "logged-out");
    }

    #[test]
    fn test_offer_screen_yields_first_row_in_document_order() {
        let state = interpret(&parse_ui_tree(OFFER_SCREEN));
        let ScreenState::Offer(offer) = state else {
            panic!("expected an offer, got {state:?}");
        };
        // First row wins even though the second pays more
        assert_eq!(offer.rate, Some(21.5));
        assert_eq!(offer.duration_mins, Some(120));
        assert_eq!(offer.location.as_deref(), Some("DSD8 - Houston"));
        assert_eq!(offer.tap, Some(Point { x: 540, y: 410 }));
    }

    #[test]
    fn test_web_login_form_is_logged_out() {
        // After "Sign in", the app hands off to the Amazon web form,
        // whose fields carry bare ids with no app prefix.
        let xml = r#"<hierarchy rotation="0">
  <android.widget.FrameLayout class="android.widget.FrameLayout" resource-id="" bounds="[0,0][1080,1920]">
    <android.widget.EditText class="android.widget.EditText" text="" resource-id="ap_email" bounds="[100,500][980,600]" />
    <android.widget.EditText class="android.widget.EditText" text="" resource-id="ap_password" bounds="[100,650][980,750]" />
    <android.widget.Button class="android.widget.Button" text="Sign in" resource-id="signInSubmit" bounds="[100,850][980,950]" />
  </android.widget.FrameLayout>
</hierarchy>"#;
        assert_eq!(interpret(&parse_ui_tree(xml)), ScreenState::LoggedOut);
    }

    #[test]
    fn test_each_web_login_field_is_a_login_anchor() {
        // A partially rendered form can show any one field alone
        for id in ["ap_email", "ap_password", "signInSubmit"] {
            let xml = format!(
                r#"<hierarchy><node resource-id="{id}" bounds="[0,0][100,100]" /></hierarchy>"#
            );
            assert_eq!(
                interpret(&parse_ui_tree(&xml)),
                ScreenState::LoggedOut,
                "id {id:?} should classify as logged out"
            );
        }
    }

    #[test]
    fn test_in_app_screen_without_offers_is_idle() {
        assert_eq!(interpret(&parse_ui_tree(IDLE_SCREEN)), ScreenState::Idle);
    }

    #[test]
    fn test_foreign_screen_is_unknown_dialog() {
        let state = interpret(&parse_ui_tree(SYSTEM_DIALOG));
        let ScreenState::UnknownDialog(summary) = state else {
            panic!("expected an unknown dialog, got {state:?}");
        };
        assert!(summary.contains("System update available"));
        assert!(summary.contains("Later"));
    }

    #[test]
    fn test_empty_snapshot_is_unknown_dialog() {
        let state = interpret(&[]);
        assert!(matches!(state, ScreenState::UnknownDialog(_)));
    }

    #[test]
    fn test_login_wins_over_offer_rows() {
        // A half-rendered transition can show both anchors at once
        let xml = r#"<hierarchy>
  <node resource-id="com.amazon.flex.rabbit:id/block_item_layout" bounds="[0,0][100,100]" />
  <node resource-id="com.amazon.flex.rabbit:id/sign_in_button" bounds="[0,200][100,300]" />
</hierarchy>"#;
        assert_eq!(interpret(&parse_ui_tree(xml)), ScreenState::LoggedOut);
    }

    // ── Offer extraction ────────────────────────────────────

    #[test]
    fn test_offer_fields_are_best_effort() {
        let xml = r#"<hierarchy>
  <node resource-id="com.amazon.flex.rabbit:id/block_item_layout" bounds="[0,0][100,100]">
    <node resource-id="com.amazon.flex.rabbit:id/block_rate" text="surge pricing" bounds="[0,0][50,50]" />
  </node>
</hierarchy>"#;
        let ScreenState::Offer(offer) = interpret(&parse_ui_tree(xml)) else {
            panic!("expected an offer");
        };
        assert_eq!(offer.rate, None);
        assert_eq!(offer.duration_mins, None);
        assert_eq!(offer.location, None);
        assert_eq!(offer.tap, Some(Point { x: 50, y: 50 }));
    }

    #[test]
    fn test_offer_without_bounds_has_no_tap_target() {
        let xml = r#"<hierarchy>
  <node resource-id="com.amazon.flex.rabbit:id/block_item_layout" />
</hierarchy>"#;
        let ScreenState::Offer(offer) = interpret(&parse_ui_tree(xml)) else {
            panic!("expected an offer");
        };
        assert_eq!(offer.tap, None);
    }

    #[test]
    fn test_second_row_fields_do_not_leak_into_first() {
        // First row carries no rate text; the second row's must not fill it
        let xml = r#"<hierarchy>
  <node resource-id="com.amazon.flex.rabbit:id/block_item_layout" bounds="[0,0][100,100]" />
  <node resource-id="com.amazon.flex.rabbit:id/block_item_layout" bounds="[0,200][100,300]">
    <node resource-id="com.amazon.flex.rabbit:id/block_rate" text="$30.00" bounds="[0,200][50,250]" />
  </node>
</hierarchy>"#;
        let ScreenState::Offer(offer) = interpret(&parse_ui_tree(xml)) else {
            panic!("expected an offer");
        };
        assert_eq!(offer.rate, None);
        assert_eq!(offer.tap, Some(Point { x: 50, y: 50 }));
    }

    // ── Text parsing ────────────────────────────────────────

    #[test]
    fn test_parse_rate_formats() {
        assert_eq!(parse_rate("$27.50"), Some(27.5));
        assert_eq!(parse_rate("$18"), Some(18.0));
        assert_eq!(parse_rate(" $21.50 "), Some(21.5));
        assert_eq!(parse_rate("27.50"), Some(27.5));
    }

    #[test]
    fn test_parse_rate_rejects_garbage() {
        assert_eq!(parse_rate(""), None);
        assert_eq!(parse_rate("surge"), None);
        assert_eq!(parse_rate("$-- "), None);
    }

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(parse_duration("120 min"), Some(120));
        assert_eq!(parse_duration("45min"), Some(45));
        assert_eq!(parse_duration("90"), Some(90));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("2 hours"), None);
    }

    // ── Confirmation ────────────────────────────────────────

    #[test]
    fn test_confirm_target_found() {
        let elements = parse_ui_tree(CONFIRM_SCREEN);
        assert_eq!(confirm_target(&elements), Some(Point { x: 540, y: 960 }));
    }

    #[test]
    fn test_confirm_target_absent() {
        assert_eq!(confirm_target(&parse_ui_tree(IDLE_SCREEN)), None);
    }

    // ── Qualification ───────────────────────────────────────

    #[test]
    fn test_offer_above_rate_floor_qualifies() {
        let offer = OfferDetails {
            rate: Some(21.5),
            duration_mins: Some(120),
            ..OfferDetails::default()
        };
        let filter = FilterSettings::default();
        assert!(offer_qualifies(&offer, &config_with_min_rate(20.0), &filter));
    }

    #[test]
    fn test_rate_floor_is_inclusive() {
        let offer = OfferDetails {
            rate: Some(20.0),
            ..OfferDetails::default()
        };
        let filter = FilterSettings::default();
        assert!(offer_qualifies(&offer, &config_with_min_rate(20.0), &filter));
    }

    #[test]
    fn test_offer_below_rate_floor_rejected() {
        let offer = OfferDetails {
            rate: Some(19.99),
            duration_mins: Some(120),
            ..OfferDetails::default()
        };
        let filter = FilterSettings::default();
        assert!(!offer_qualifies(&offer, &config_with_min_rate(20.0), &filter));
    }

    #[test]
    fn test_offer_with_unreadable_rate_rejected() {
        let offer = OfferDetails {
            rate: None,
            duration_mins: Some(120),
            ..OfferDetails::default()
        };
        let filter = FilterSettings::default();
        assert!(!offer_qualifies(&offer, &config_with_min_rate(20.0), &filter));
    }

    #[test]
    fn test_offer_outside_duration_band_rejected() {
        let offer = OfferDetails {
            rate: Some(30.0),
            duration_mins: Some(300),
            ..OfferDetails::default()
        };
        let filter = FilterSettings {
            min_duration_mins: 60,
            max_duration_mins: 240,
            history_limit: 365,
        };
        assert!(!offer_qualifies(&offer, &config_with_min_rate(20.0), &filter));
    }
}
