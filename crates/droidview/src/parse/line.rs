//! Parser for the line-oriented view-server dump format
//!
//! Each line is `<indent><class@hexhash> <attr>=<len>,<value> ...` where
//! the indentation strictly encodes tree depth. The declared value length
//! is advisory, except for the designated text attribute, whose embedded
//! spaces are sentinel-escaped before tokenizing so they cannot collide
//! with the token separator.

use crate::config::Era;
use crate::error::{DroidError, Result};
use crate::tree::{Backend, NodeId, TreeBuilder, ViewTree};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

/// Private-use character standing in for spaces inside the text attribute
/// while a line is tokenized.
const SPACE_SENTINEL: char = '\u{e000}';

lazy_static! {
    static ref RE_ATTR_TOKEN: Regex = Regex::new(r"^(?P<name>[^=]+?)=(?P<len>\d+),(?P<value>.*)$").unwrap();
    static ref RE_CLASS_TOKEN: Regex =
        Regex::new(r"^(?P<class>[A-Za-z_$][A-Za-z0-9_$.]*)@(?P<hash>[0-9a-fA-F]+)$").unwrap();
}

/// Replace spaces inside the declared length of the text attribute's value
/// with the sentinel. The sentinel is restored after tokenizing.
fn escape_text_attr(line: &str, text_attr: &str) -> String {
    let needle = format!("{}=", text_attr);
    let Some(pos) = line.find(&needle) else {
        return line.to_string();
    };
    let after = pos + needle.len();
    let digits: String = line[after..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let Ok(len) = digits.parse::<usize>() else {
        return line.to_string();
    };
    let rest = &line[after + digits.len()..];
    if !rest.starts_with(',') {
        return line.to_string();
    }
    let value_start = after + digits.len() + 1;
    let mut out = String::with_capacity(line.len());
    out.push_str(&line[..value_start]);
    let mut chars = line[value_start..].chars();
    for _ in 0..len {
        match chars.next() {
            Some(' ') => out.push(SPACE_SENTINEL),
            Some(c) => out.push(c),
            None => break,
        }
    }
    out.push_str(chars.as_str());
    out
}

/// Tokenize one node line into its attribute map. The class name and
/// identity hash come from the leading `class@hexhash` token, which does
/// not match the attribute shape.
fn parse_node_line(content: &str, text_attr: &str) -> Result<HashMap<String, String>> {
    let escaped = escape_text_attr(content, text_attr);
    let mut tokens = escaped.split_whitespace();
    let head = tokens
        .next()
        .ok_or_else(|| DroidError::parse("empty node line", content.to_string()))?;
    let caps = RE_CLASS_TOKEN
        .captures(head)
        .ok_or_else(|| DroidError::parse("malformed class token", content.to_string()))?;
    let mut attributes = HashMap::new();
    attributes.insert("class".to_string(), caps["class"].to_string());
    attributes.insert("hashcode".to_string(), caps["hash"].to_string());
    for token in tokens {
        let caps = RE_ATTR_TOKEN
            .captures(token)
            .ok_or_else(|| DroidError::parse("malformed attribute token", token.to_string()))?;
        // the declared length is advisory only
        let value = caps["value"].replace(SPACE_SENTINEL, " ");
        attributes.insert(caps["name"].to_string(), value);
    }
    Ok(attributes)
}

fn is_done_marker(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed == "DONE" || trimmed == "DONE."
}

/// Parse a line-oriented dump produced by a device with the given SDK
/// version into a fully linked tree.
pub fn parse(dump: &str, sdk: u32) -> Result<ViewTree> {
    let era = Era::for_line_dump(sdk);
    let text_attr = era.names().text;
    let mut builder = TreeBuilder::new(Backend::ViewServer, era);
    let mut stack: Vec<(usize, NodeId)> = Vec::new();
    for raw in dump.lines() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        if is_done_marker(line) {
            break;
        }
        let depth = line.len() - line.trim_start_matches(' ').len();
        let content = &line[depth..];
        let attributes = parse_node_line(content, text_attr)?;
        let parent = if stack.is_empty() {
            if depth != 0 {
                return Err(DroidError::parse(
                    "root node must not be indented",
                    line.to_string(),
                ));
            }
            None
        } else {
            let last_depth = stack.last().map(|&(d, _)| d).unwrap_or(0);
            if depth > last_depth + 1 {
                return Err(DroidError::parse(
                    format!(
                        "illegal indentation jump from depth {} to {}",
                        last_depth, depth
                    ),
                    line.to_string(),
                ));
            }
            while stack.last().is_some_and(|&(d, _)| d >= depth) {
                stack.pop();
            }
            match stack.last() {
                Some(&(_, id)) => Some(id),
                None => {
                    return Err(DroidError::parse(
                        "dump contains more than one root",
                        line.to_string(),
                    ))
                }
            }
        };
        let id = builder.push_node(parent, attributes, None)?;
        stack.push((depth, id));
    }
    builder.finish()
}
