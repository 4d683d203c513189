//! Adapts an externally styled SVG to the host theme.
//!
//! The document is streamed through `lol_html`, which acts as the markup parser and
//! serializer. Every rewrite is a fixpoint, so sanitizing sanitized output is a no-op.
//! `lol_html` lowercases the names it writes, so the camel-cased root attributes are
//! spliced into the root start tag after the rewrite.

use crate::config::Theme;
use crate::core::document::extract_svg_element;
use crate::utils::error::{MeteogramError, Result};
use lol_html::html_content::Element;
use lol_html::{element, rewrite_str, RewriteStrSettings};
use std::cell::{Cell, RefCell};

const DEFAULT_ASPECT: &str = "xMidYMid meet";

pub fn sanitize(raw_svg: &str, theme: &Theme) -> Result<String> {
    let svg = extract_svg_element(raw_svg).ok_or(MeteogramError::InvalidSvg)?;
    let seen_root = Cell::new(false);
    let root_attributes = RefCell::new(String::new());
    let background = theme.background_color.trim();

    let output = rewrite_str(
        svg,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("svg", |el| {
                    if !seen_root.replace(true) {
                        *root_attributes.borrow_mut() = fit_root(el);
                    }
                    Ok(())
                }),
                element!("style", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("filter", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("script", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("*", |el| {
                    strip_unsafe_attributes(el);
                    Ok(())
                }),
                element!("rect", |el| {
                    clear_white_fill(el)?;
                    Ok(())
                }),
                element!("foreignobject > *", |el| {
                    let style = el.get_attribute("style").unwrap_or_default();
                    let mut style = without_property(&style, "background-color");
                    if !style.is_empty() {
                        style.push_str("; ");
                    }
                    style.push_str(&format!("background-color: {} !important", background));
                    el.set_attribute("style", &style)?;
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::new()
        },
    )
    .map_err(|e| {
        tracing::debug!("SVG rewrite failed: {}", e);
        MeteogramError::InvalidSvg
    })?;

    if !seen_root.get() {
        return Err(MeteogramError::InvalidSvg);
    }

    let mut output = output;
    let extra = root_attributes.into_inner();
    if !extra.is_empty() {
        let end = start_tag_end(&output).ok_or(MeteogramError::InvalidSvg)?;
        let at = if output[..end].ends_with('/') { end - 1 } else { end };
        output.insert_str(at, &extra);
    }
    Ok(output)
}

/// Drops the fixed size from the root and returns the attributes to add to it:
/// a viewBox synthesised from that size, and the default aspect handling.
fn fit_root(el: &mut Element) -> String {
    let mut extra = String::new();

    if !el.has_attribute("viewBox") {
        let width = el.get_attribute("width").and_then(|w| dimension(&w));
        let height = el.get_attribute("height").and_then(|h| dimension(&h));
        if let (Some(width), Some(height)) = (width, height) {
            extra.push_str(&format!(r#" viewBox="0 0 {} {}""#, width, height));
        }
    }

    for name in ["width", "height"] {
        if el.has_attribute(name) {
            el.remove_attribute(name);
        }
    }

    if !el.has_attribute("preserveAspectRatio") {
        extra.push_str(&format!(r#" preserveAspectRatio="{}""#, DEFAULT_ASPECT));
    }
    extra
}

/// Byte offset of the `>` closing the first start tag, skipping quoted values.
fn start_tag_end(markup: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in markup.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '>' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

/// `"960px"` -> `"960"`; anything that is not a plain number (e.g. `"100%"`) is rejected.
fn dimension(value: &str) -> Option<String> {
    let value = value.trim();
    let number = value.strip_suffix("px").unwrap_or(value).trim();
    number.parse::<f64>().ok().filter(|n| n.is_finite())?;
    Some(number.to_string())
}

fn strip_unsafe_attributes(el: &mut Element) {
    let names: Vec<String> = el
        .attributes()
        .iter()
        .map(|attr| attr.name())
        .filter(|name| {
            let lower = name.to_ascii_lowercase();
            lower == "filter" || lower.starts_with("on")
        })
        .collect();

    for name in names {
        el.remove_attribute(&name);
    }
}

fn clear_white_fill(el: &mut Element) -> std::result::Result<(), lol_html::errors::AttributeNameError> {
    let style = el.get_attribute("style");
    let style_fill = style
        .as_deref()
        .and_then(|s| declarations(s).filter(|(name, _)| name == "fill").last())
        .map(|(_, value)| value);
    let fill = style_fill.or_else(|| el.get_attribute("fill"));

    if !fill.as_deref().is_some_and(is_white) {
        return Ok(());
    }

    el.set_attribute("fill", "none")?;
    if let Some(style) = style {
        let remaining = without_property(&style, "fill");
        if remaining.is_empty() {
            el.remove_attribute("style");
        } else {
            el.set_attribute("style", &remaining)?;
        }
    }
    Ok(())
}

fn is_white(color: &str) -> bool {
    let normalized: String = color
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    let normalized = normalized.trim_end_matches("!important");
    matches!(normalized, "#fff" | "#ffffff" | "white" | "rgb(255,255,255)")
}

/// Splits an inline style on the `;` that sit outside quotes and parentheses.
fn split_declarations(style: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote = None;
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in style.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ';' if depth == 0 => {
                    parts.push(&style[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    parts.push(&style[start..]);
    parts
}

fn property_name(declaration: &str) -> Option<String> {
    let (name, _) = declaration.split_once(':')?;
    Some(name.trim().to_ascii_lowercase())
}

/// Parses an inline style into lower-cased property names and trimmed values.
fn declarations(style: &str) -> impl Iterator<Item = (String, String)> + '_ {
    split_declarations(style).into_iter().filter_map(|decl| {
        let (name, value) = decl.split_once(':')?;
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return None;
        }
        Some((name, value.trim().to_string()))
    })
}

/// Drops every `property` declaration; the others are kept as written.
fn without_property(style: &str, property: &str) -> String {
    split_declarations(style)
        .into_iter()
        .map(str::trim)
        .filter(|decl| !decl.is_empty())
        .filter(|decl| property_name(decl).as_deref() != Some(property))
        .collect::<Vec<_>>()
        .join("; ")
}
