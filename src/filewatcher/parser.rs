//! Extracts the GUI address and API key from Syncthing's config.xml.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::types::MonitorError;

/// Connection parameters derived from the `<gui>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuiConfig {
    pub uri: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Outside,
    Gui,
    Address,
    ApiKey,
}

/// Only the first `<gui>` element counts; everything else in the document is
/// skipped.
pub fn parse_config_xml(contents: &str) -> Result<GuiConfig, MonitorError> {
    let mut scope = Scope::Outside;
    let mut tls = false;
    let mut address: Option<String> = None;
    let mut api_key: Option<String> = None;
    let mut text = String::new();
    let mut rest = contents;

    while let Some(start) = rest.find('<') {
        if matches!(scope, Scope::Address | Scope::ApiKey) {
            text.push_str(&decode_entities(&rest[..start]));
        }
        rest = &rest[start..];

        if let Some(body) = rest.strip_prefix("<!--") {
            rest = skip_past(body, "-->")?;
            continue;
        }
        if let Some(body) = rest.strip_prefix("<![CDATA[") {
            let end = body.find("]]>").ok_or_else(|| malformed("unterminated CDATA"))?;
            if matches!(scope, Scope::Address | Scope::ApiKey) {
                text.push_str(&body[..end]);
            }
            rest = &body[end + 3..];
            continue;
        }
        if let Some(body) = rest.strip_prefix("<?") {
            rest = skip_past(body, "?>")?;
            continue;
        }
        if let Some(body) = rest.strip_prefix("<!") {
            rest = skip_past(body, ">")?;
            continue;
        }

        let end = rest.find('>').ok_or_else(|| malformed("unterminated tag"))?;
        let tag = &rest[1..end];
        rest = &rest[end + 1..];

        if let Some(name) = tag.strip_prefix('/') {
            match (scope, name.trim()) {
                (Scope::Address, "address") => {
                    address = non_empty(&text);
                    scope = Scope::Gui;
                }
                (Scope::ApiKey, "apikey") => {
                    api_key = non_empty(&text);
                    scope = Scope::Gui;
                }
                (Scope::Gui, "gui") => break,
                _ => {}
            }
            continue;
        }

        let self_closing = tag.ends_with('/');
        let tag = tag.trim_end_matches('/');
        let (name, attributes) = split_tag(tag);
        match (scope, name) {
            (Scope::Outside, "gui") => {
                tls = attribute(attributes, "tls")
                    .map(|value| value.trim().eq_ignore_ascii_case("true"))
                    .unwrap_or(false);
                if self_closing {
                    break;
                }
                scope = Scope::Gui;
            }
            (Scope::Gui, "address") if !self_closing => {
                text.clear();
                scope = Scope::Address;
            }
            (Scope::Gui, "apikey") if !self_closing => {
                text.clear();
                scope = Scope::ApiKey;
            }
            _ => {}
        }
    }

    let scheme = if tls { "https" } else { "http" };
    Ok(GuiConfig {
        uri: address.map(|address| format!("{scheme}://{address}")),
        api_key,
    })
}

/// Reads and parses config.xml. Failures are logged and yield an empty
/// result, never an error.
pub fn read_config_file(path: &Path) -> GuiConfig {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to read Syncthing config file");
            return GuiConfig::default();
        }
    };
    match parse_config_xml(&contents) {
        Ok(parsed) => {
            debug!(
                path = %path.display(),
                uri = ?parsed.uri,
                api_key = parsed.api_key.is_some(),
                "Parsed Syncthing config file"
            );
            parsed
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to parse Syncthing config file");
            GuiConfig::default()
        }
    }
}

fn skip_past<'a>(body: &'a str, terminator: &str) -> Result<&'a str, MonitorError> {
    let end = body
        .find(terminator)
        .ok_or_else(|| malformed("unterminated markup declaration"))?;
    Ok(&body[end + terminator.len()..])
}

fn malformed(reason: &str) -> MonitorError {
    MonitorError::Config(format!("malformed config.xml: {reason}"))
}

fn split_tag(tag: &str) -> (&str, &str) {
    let tag = tag.trim();
    match tag.find(char::is_whitespace) {
        Some(split) => (&tag[..split], &tag[split..]),
        None => (tag, ""),
    }
}

/// Value of attribute `wanted`, quoted with either `"` or `'`.
fn attribute(attributes: &str, wanted: &str) -> Option<String> {
    let mut rest = attributes;
    loop {
        rest = rest.trim_start();
        let equals = rest.find('=')?;
        let name = rest[..equals].trim();
        let after = rest[equals + 1..].trim_start();
        let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let value_and_rest = &after[1..];
        let close = value_and_rest.find(quote)?;
        if name == wanted {
            return Some(decode_entities(&value_and_rest[..close]));
        }
        rest = &value_and_rest[close + 1..];
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut decoded = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let Some(end) = candidate.find(';') else {
            decoded.push_str(candidate);
            return decoded;
        };
        match decode_entity(&candidate[1..end]) {
            Some(c) => decoded.push(c),
            None => decoded.push_str(&candidate[..=end]),
        }
        rest = &candidate[end + 1..];
    }
    decoded.push_str(rest);
    decoded
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let number = entity.strip_prefix('#')?;
            let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
