//! Parser for the instrumentation XML dump format
//!
//! Each element becomes one node. Bounds arrive absolute in a
//! `bounds="[l,t][r,b]"` attribute; ids are synthesized with the same
//! `id/no_id/<n>` scheme as the line-oriented backend.

use crate::config::Era;
use crate::error::{DroidError, Result};
use crate::tree::{Backend, Bounds, NodeId, TreeBuilder, ViewTree};
use lazy_static::lazy_static;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref RE_BOUNDS: Regex =
        Regex::new(r"^\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]$").unwrap();
}

/// Cut the known noise around an instrumentation dump read through the
/// shell: kernel/linker warnings before the XML prolog, and the banner plus
/// the `Killed` line some devices print after reaping the dumping process.
pub fn strip_dump_noise(raw: &str) -> &str {
    let start = raw
        .find("<?xml")
        .or_else(|| raw.find("<hierarchy"))
        .unwrap_or(0);
    let end = raw
        .rfind("</hierarchy>")
        .map(|i| i + "</hierarchy>".len())
        .unwrap_or(raw.len());
    if end <= start {
        return raw.trim();
    }
    raw[start..end].trim()
}

fn parse_bounds(value: &str) -> Result<Bounds> {
    let caps = RE_BOUNDS
        .captures(value.trim())
        .ok_or_else(|| DroidError::parse("malformed bounds attribute", value.to_string()))?;
    let coord = |i: usize| caps[i].parse::<i32>().unwrap_or(0);
    Ok(Bounds::new(coord(1), coord(2), coord(3), coord(4)))
}

fn element_attributes(element: &BytesStart<'_>) -> Result<(HashMap<String, String>, Option<Bounds>)> {
    let mut attributes = HashMap::new();
    let mut bounds = None;
    for attr in element.attributes() {
        let attr = attr.map_err(|e| {
            DroidError::parse(
                format!("malformed XML attribute: {}", e),
                String::from_utf8_lossy(element.name().as_ref()).into_owned(),
            )
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| {
                DroidError::parse(format!("malformed XML attribute value: {}", e), key.clone())
            })?
            .into_owned();
        if key == "bounds" {
            bounds = Some(parse_bounds(&value)?);
        }
        attributes.insert(key, value);
    }
    // the hierarchy root carries no class attribute; fall back to the tag
    if !attributes.contains_key("class") {
        attributes.insert(
            "class".to_string(),
            String::from_utf8_lossy(element.name().as_ref()).into_owned(),
        );
    }
    Ok((attributes, bounds))
}

/// Parse an instrumentation XML dump into a fully linked tree.
pub fn parse(xml: &str) -> Result<ViewTree> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut builder = TreeBuilder::new(Backend::UiAutomator, Era::for_xml_dump());
    let mut stack: Vec<NodeId> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                let (attributes, bounds) = element_attributes(&element)?;
                let id = builder.push_node(stack.last().copied(), attributes, bounds)?;
                stack.push(id);
            }
            Ok(Event::Empty(element)) => {
                let (attributes, bounds) = element_attributes(&element)?;
                builder.push_node(stack.last().copied(), attributes, bounds)?;
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                let position = reader.buffer_position();
                let tail: String = xml
                    .get(position.saturating_sub(40)..position.min(xml.len()))
                    .unwrap_or("")
                    .to_string();
                return Err(DroidError::parse(
                    format!("XML not well-formed: {}", e),
                    tail,
                ));
            }
        }
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_XML: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <node index="0" text="" resource-id="" class="android.widget.FrameLayout" content-desc="" bounds="[0,0][1080,1920]">
    <node index="0" text="Sign in" resource-id="com.example:id/sign_in" class="android.widget.Button" content-desc="Sign in button" bounds="[40,100][300,180]"/>
    <node index="1" text="" resource-id="" class="android.widget.ImageView" content-desc="" bounds="[0,200][1080,400]"/>
  </node>
</hierarchy>"#;

    #[test]
    fn test_parse_sample_hierarchy() {
        let tree = parse(SAMPLE_XML).unwrap();
        // hierarchy root + frame + two children
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.class_name(tree.root()), Some("hierarchy"));
        let button = tree.by_unique_id("com.example:id/sign_in").unwrap();
        assert_eq!(tree.text(button), Some("Sign in"));
        assert_eq!(tree.content_description(button), Some("Sign in button"));
        assert_eq!(
            tree.node(button).bounds(),
            Some(Bounds::new(40, 100, 300, 180))
        );
    }

    #[test]
    fn test_empty_resource_ids_get_synthesized_ids() {
        let tree = parse(SAMPLE_XML).unwrap();
        // hierarchy, frame and image have no resource-id
        assert!(tree.by_unique_id("id/no_id/0").is_some());
        assert!(tree.by_unique_id("id/no_id/1").is_some());
        assert!(tree.by_unique_id("id/no_id/2").is_some());
        assert_eq!(tree.len(), tree.id_map().len());
    }

    #[test]
    fn test_bounds_quad_parse() {
        let bounds = parse_bounds("[0,75][1080,1920]").unwrap();
        assert_eq!(bounds, Bounds::new(0, 75, 1080, 1920));
        assert!(parse_bounds("not bounds").is_err());
    }

    #[test]
    fn test_malformed_xml_is_a_parse_error() {
        let err = parse("<hierarchy><node></hierarchy>").unwrap_err();
        assert!(matches!(err, DroidError::Parse { .. }));
    }

    #[test]
    fn test_strip_dump_noise() {
        let raw = "WARNING: linker: libdvm.so has text relocations\n\
<?xml version='1.0'?><hierarchy rotation=\"0\"></hierarchy>\n\
UI hierchary dumped to: /dev/tty\nKilled\n";
        let cleaned = strip_dump_noise(raw);
        assert!(cleaned.starts_with("<?xml"));
        assert!(cleaned.ends_with("</hierarchy>"));
    }

    #[test]
    fn test_strip_dump_noise_passthrough() {
        assert_eq!(strip_dump_noise("  <hierarchy/>  "), "<hierarchy/>");
    }
}
