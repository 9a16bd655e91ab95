//! UI hierarchy parsing for page-source snapshots
//!
//! The automation server describes the foreground screen as an XML document
//! (`<hierarchy>` root, one node per view). This module flattens that
//! document into a `Vec<UiElement>` in document order. Parsing is total:
//! malformed input yields whatever prefix parsed cleanly, never an error.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use flexd_core::prelude::*;
use flexd_core::Point;

/// Pixel rectangle a view occupies on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    /// Center point, where taps land.
    pub fn center(&self) -> Point {
        Point {
            x: (self.left + self.right) / 2,
            y: (self.top + self.bottom) / 2,
        }
    }
}

/// One view node from a page-source snapshot.
///
/// Fields default to empty strings when the source omits the attribute,
/// so callers compare against anchors without unwrapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiElement {
    /// Android widget class, e.g. `android.widget.Button`.
    pub class: String,
    /// Fully-qualified resource id, e.g. `com.amazon.flex.rabbit:id/block_rate`.
    pub resource_id: String,
    /// Visible text.
    pub text: String,
    /// Accessibility description.
    pub content_desc: String,
    /// On-screen rectangle, if the node reported one.
    pub bounds: Option<Bounds>,
}

impl UiElement {
    /// Center of this element's bounds, if known.
    pub fn center(&self) -> Option<Point> {
        self.bounds.map(|b| b.center())
    }
}

/// Flattens a page-source XML document into elements in document order.
///
/// The `<hierarchy>` root carries no view attributes and is skipped. A
/// parse error mid-document logs a warning and returns the elements read
/// so far.
pub fn parse_ui_tree(xml: &str) -> Vec<UiElement> {
    let mut reader = Reader::from_str(xml);
    let mut elements = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(node)) | Ok(Event::Empty(node)) => {
                if node.name().as_ref() == b"hierarchy" {
                    continue;
                }
                elements.push(element_from_node(&node));
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                warn!(error = %err, parsed = elements.len(), "page source truncated by XML error");
                break;
            }
            Ok(_) => {}
        }
    }

    elements
}

/// Reads the view attributes off a single XML node.
fn element_from_node(node: &BytesStart<'_>) -> UiElement {
    let mut element = UiElement {
        class: String::from_utf8_lossy(node.name().as_ref()).into_owned(),
        ..UiElement::default()
    };

    for attr in node.attributes().flatten() {
        let value = attr.unescape_value().unwrap_or_default();
        match attr.key.as_ref() {
            b"class" => element.class = value.into_owned(),
            b"resource-id" => element.resource_id = value.into_owned(),
            b"text" => element.text = value.into_owned(),
            b"content-desc" => element.content_desc = value.into_owned(),
            b"bounds" => element.bounds = parse_bounds(&value),
            _ => {}
        }
    }

    element
}

/// Parses the `bounds` attribute format `[x1,y1][x2,y2]`.
///
/// Returns `None` for anything that doesn't match, including the
/// zero-size placeholder some nodes report.
pub fn parse_bounds(raw: &str) -> Option<Bounds> {
    let inner = raw.strip_prefix('[')?;
    let (first, rest) = inner.split_once("][")?;
    let second = rest.strip_suffix(']')?;
    let (left, top) = first.split_once(',')?;
    let (right, bottom) = second.split_once(',')?;
    Some(Bounds {
        left: left.trim().parse().ok()?,
        top: top.trim().parse().ok()?,
        right: right.trim().parse().ok()?,
        bottom: bottom.trim().parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER_SCREEN: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <android.widget.FrameLayout index="0" package="com.amazon.flex.rabbit" class="android.widget.FrameLayout" text="" resource-id="" bounds="[0,0][1080,1920]">
    <android.view.ViewGroup index="0" class="android.view.ViewGroup" text="" resource-id="com.amazon.flex.rabbit:id/block_item_layout" bounds="[40,300][1040,520]">
      <android.widget.TextView index="0" class="android.widget.TextView" text="$27.50" resource-id="com.amazon.flex.rabbit:id/block_rate" bounds="[60,320][400,380]" />
      <android.widget.TextView index="1" class="android.widget.TextView" text="120 min" resource-id="com.amazon.flex.rabbit:id/block_duration" bounds="[60,400][400,460]" />
    </android.view.ViewGroup>
  </android.widget.FrameLayout>
</hierarchy>"#;

    #[test]
    fn test_parse_ui_tree_document_order() {
        let elements = parse_ui_tree(OFFER_SCREEN);
        assert_eq!(elements.len(), 4);
        assert_eq!(elements[0].class, "android.widget.FrameLayout");
        assert_eq!(
            elements[1].resource_id,
            "com.amazon.flex.rabbit:id/block_item_layout"
        );
        assert_eq!(elements[2].text, "$27.50");
        assert_eq!(elements[3].text, "120 min");
    }

    #[test]
    fn test_parse_ui_tree_skips_hierarchy_root() {
        let elements = parse_ui_tree("<hierarchy rotation=\"0\"></hierarchy>");
        assert!(elements.is_empty());
    }

    #[test]
    fn test_parse_ui_tree_reads_bounds_center() {
        let elements = parse_ui_tree(OFFER_SCREEN);
        let offer = &elements[1];
        assert_eq!(
            offer.bounds,
            Some(Bounds {
                left: 40,
                top: 300,
                right: 1040,
                bottom: 520
            })
        );
        assert_eq!(offer.center(), Some(Point { x: 540, y: 410 }));
    }

    #[test]
    fn test_parse_ui_tree_unescapes_attribute_text() {
        let xml = r#"<hierarchy><node class="android.widget.TextView" text="Pick up &amp; deliver" resource-id="" bounds="[0,0][10,10]" /></hierarchy>"#;
        let elements = parse_ui_tree(xml);
        assert_eq!(elements[0].text, "Pick up & deliver");
    }

    #[test]
    fn test_parse_ui_tree_tag_name_fallback_for_class() {
        // UiAutomator2 uses the widget class as the tag name; a node
        // without a class attribute still gets one from the tag.
        let xml = r#"<hierarchy><android.widget.Button text="Go" bounds="[0,0][10,10]" /></hierarchy>"#;
        let elements = parse_ui_tree(xml);
        assert_eq!(elements[0].class, "android.widget.Button");
    }

    #[test]
    fn test_parse_ui_tree_malformed_returns_prefix() {
        let xml = r#"<hierarchy><node resource-id="a" bounds="[0,0][1,1]"/><node resource-id="b" <<<"#;
        let elements = parse_ui_tree(xml);
        // The first node parsed cleanly; the syntax error ends the scan.
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].resource_id, "a");
    }

    #[test]
    fn test_parse_ui_tree_empty_input() {
        assert!(parse_ui_tree("").is_empty());
    }

    #[test]
    fn test_parse_bounds_valid() {
        assert_eq!(
            parse_bounds("[0,0][1080,1920]"),
            Some(Bounds {
                left: 0,
                top: 0,
                right: 1080,
                bottom: 1920
            })
        );
    }

    #[test]
    fn test_parse_bounds_negative_coordinates() {
        // Views scrolled partly off screen report negative origins
        assert_eq!(
            parse_bounds("[-20,-5][100,50]"),
            Some(Bounds {
                left: -20,
                top: -5,
                right: 100,
                bottom: 50
            })
        );
    }

    #[test]
    fn test_parse_bounds_rejects_malformed() {
        assert_eq!(parse_bounds(""), None);
        assert_eq!(parse_bounds("[0,0]"), None);
        assert_eq!(parse_bounds("0,0 1080,1920"), None);
        assert_eq!(parse_bounds("[a,b][c,d]"), None);
        assert_eq!(parse_bounds("[0,0][1080,1920"), None);
    }

    #[test]
    fn test_element_missing_attributes_default_empty() {
        let xml = r#"<hierarchy><node /></hierarchy>"#;
        let elements = parse_ui_tree(xml);
        assert_eq!(elements[0].resource_id, "");
        assert_eq!(elements[0].text, "");
        assert_eq!(elements[0].bounds, None);
        assert_eq!(elements[0].center(), None);
    }
}
