//! Selector generation from an element descriptor
//!
//! Candidates are emitted most robust first:
//! 1. role + accessible label
//! 2. stable test identifier
//! 3. element id (generated-looking ids skipped)
//! 4. name attribute
//! 5. placeholder
//! 6. visible text
//! 7. class-derived
//! 8. full structural path
//!
//! Generation is pure; the same descriptor always yields the same set.

use crate::types::{ElementDescriptor, LocatorStrategy, PathSegment, SelectorSet};

const MAX_TEXT_CHARS: usize = 80;
const MAX_CLASSES: usize = 3;

/// Deterministic selector generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorGenerator;

impl SelectorGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Ranked list of `(strategy, selector)` pairs, duplicates removed.
    pub fn ranked(&self, descriptor: &ElementDescriptor) -> Vec<(LocatorStrategy, String)> {
        let tag = element_tag(descriptor);
        let mut out: Vec<(LocatorStrategy, String)> = Vec::new();
        let mut emit = |strategy: LocatorStrategy, selector: String| {
            if !out.iter().any(|(_, s)| s == &selector) {
                out.push((strategy, selector));
            }
        };

        let label = non_empty(descriptor.aria_label.as_deref());
        match (non_empty(descriptor.role.as_deref()), label) {
            (Some(role), Some(label)) => emit(
                LocatorStrategy::AriaRole,
                format!("role={}[name=\"{}\"]", role.to_ascii_lowercase(), quote(label)),
            ),
            (None, Some(label)) => emit(
                LocatorStrategy::AriaRole,
                format!("{}[aria-label=\"{}\"]", tag, quote(label)),
            ),
            _ => {}
        }

        if let Some((attr, value)) = descriptor.test_id() {
            emit(
                LocatorStrategy::TestId,
                format!("[{}=\"{}\"]", attr, quote(value)),
            );
        }

        if let Some(id) = non_empty(descriptor.id.as_deref()) {
            if !looks_generated(id) {
                emit(LocatorStrategy::ElementId, format!("#{}", css_escape(id)));
            }
        }

        if let Some(name) = non_empty(descriptor.name.as_deref()) {
            emit(
                LocatorStrategy::Name,
                format!("{}[name=\"{}\"]", tag, quote(name)),
            );
        }

        if let Some(placeholder) = non_empty(descriptor.placeholder.as_deref()) {
            emit(
                LocatorStrategy::Placeholder,
                format!("{}[placeholder=\"{}\"]", tag, quote(placeholder)),
            );
        }

        if let Some(text) = descriptor.text.as_deref().map(normalize_text) {
            if !text.is_empty() {
                emit(LocatorStrategy::Text, format!("text=\"{}\"", quote(&text)));
            }
        }

        let classes: Vec<String> = descriptor
            .classes
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty() && !is_unstable_class(c))
            .take(MAX_CLASSES)
            .map(css_escape)
            .collect();
        if !classes.is_empty() {
            emit(
                LocatorStrategy::ClassName,
                format!("{}.{}", tag, classes.join(".")),
            );
        }

        emit(
            LocatorStrategy::StructuralPath,
            structural_path(&descriptor.path, &tag),
        );

        out
    }

    pub fn generate(&self, descriptor: &ElementDescriptor) -> SelectorSet {
        let ranked = self.ranked(descriptor);
        SelectorSet::new(ranked.into_iter().map(|(_, s)| s))
            .unwrap_or_else(|_| SelectorSet::single("*"))
    }
}

/// Convenience wrapper over [`SelectorGenerator::generate`].
pub fn generate(descriptor: &ElementDescriptor) -> SelectorSet {
    SelectorGenerator::new().generate(descriptor)
}

fn element_tag(descriptor: &ElementDescriptor) -> String {
    descriptor
        .tag
        .as_deref()
        .map(str::trim)
        .filter(|t| is_tag_name(t))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "*".to_string())
}

fn structural_path(path: &[PathSegment], tag: &str) -> String {
    let segments: Vec<String> = path
        .iter()
        .filter(|segment| is_tag_name(segment.tag.trim()))
        .map(|segment| {
            let name = segment.tag.trim().to_ascii_lowercase();
            if name == "html" || name == "body" {
                name
            } else {
                format!("{}:nth-of-type({})", name, segment.nth.max(1))
            }
        })
        .collect();
    if segments.is_empty() {
        tag.to_string()
    } else {
        segments.join(" > ")
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn is_tag_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Trim, collapse whitespace and cap at `MAX_TEXT_CHARS`.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_TEXT_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Escape a value for use inside a double-quoted attribute selector.
fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Escape an identifier for `#id` / `.class` use.
pub fn css_escape(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    for (idx, ch) in ident.chars().enumerate() {
        let safe = ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || !ch.is_ascii();
        if idx == 0 && ch.is_ascii_digit() {
            out.push_str(&format!("\\{:x} ", ch as u32));
        } else if safe {
            out.push(ch);
        } else {
            out.push('\\');
            out.push(ch);
        }
    }
    out
}

/// Ids emitted by frameworks or build tools change between renders.
pub fn looks_generated(id: &str) -> bool {
    const PREFIXES: &[&str] = &["ember", "react-", "mui-", "radix-", "headlessui-", "ng-", "__"];
    if id.starts_with(':') || PREFIXES.iter().any(|p| id.starts_with(p)) {
        return true;
    }

    let digits = id.chars().filter(|c| c.is_ascii_digit()).count();
    let longest_digit_run = id
        .split(|c: char| !c.is_ascii_digit())
        .map(str::len)
        .max()
        .unwrap_or(0);
    if longest_digit_run >= 4 {
        return true;
    }

    // uuid or hash-like tokens: long hex runs mixing letters and digits
    let hex_token = id
        .split(|c: char| c == '-' || c == '_')
        .any(|part| part.len() >= 8 && part.chars().all(|c| c.is_ascii_hexdigit()) && digits > 0);
    hex_token
}

/// State and utility classes describe appearance, not identity.
pub fn is_unstable_class(class: &str) -> bool {
    const STATES: &[&str] = &[
        "active", "disabled", "selected", "focus", "focused", "hover", "open", "closed",
        "hidden", "visible", "show", "collapsed", "expanded", "checked", "loading", "current",
    ];
    const UTILITY_PREFIXES: &[&str] = &[
        "is-", "has-", "js-", "css-", "sc-", "mt-", "mb-", "ml-", "mr-", "mx-", "my-", "pt-",
        "pb-", "pl-", "pr-", "px-", "py-", "m-", "p-", "w-", "h-", "text-", "bg-", "flex",
        "grid", "col-", "row-", "gap-",
    ];
    let lower = class.to_ascii_lowercase();
    STATES.contains(&lower.as_str())
        || UTILITY_PREFIXES.iter().any(|p| lower.starts_with(p))
        || lower.contains(':')
        || lower.contains('[')
        || looks_generated(&lower)
}
