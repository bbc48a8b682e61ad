//! Best-effort markup sanitization
//!
//! The input is re-parsed as a markup fragment and rewritten event by event:
//! denied elements are dropped with their whole subtree, denied event-handler
//! attributes are stripped from every remaining element, and everything else
//! is serialized back unchanged. This is a deny-list, not a security-grade
//! allow-list sanitizer.
//!
//! Failure policy: if the fragment cannot be parsed or re-serialized, the
//! original input is returned unchanged. Display always needs some string.

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

/// Element kinds removed entirely, subtree included
const DENIED_TAGS: &[&[u8]] = &[b"script"];

/// Event-handler attributes stripped from every element
const DENIED_ATTRIBUTES: &[&[u8]] = &[
    b"onload",
    b"onerror",
    b"onclick",
    b"onmouseover",
    b"onfocus",
    b"onblur",
    b"onmouseout",
    b"onchange",
    b"onsubmit",
    b"onkeydown",
];

/// Neutralize dangerous constructs in a markup fragment
pub fn sanitize(input: &str) -> String {
    match sanitize_fragment(input) {
        Ok(clean) => clean,
        Err(_) => input.to_string(),
    }
}

fn sanitize_fragment(input: &str) -> anyhow::Result<String> {
    let mut reader = Reader::from_str(input);
    // Pasted markup is rarely well formed; mismatched closers are tolerated
    reader.config_mut().check_end_names = false;

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();
    // Element nesting depth inside a denied subtree; 0 means not skipping
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                if skip_depth > 0 {
                    skip_depth += 1;
                } else if is_denied_tag(e.name().as_ref()) {
                    skip_depth = 1;
                } else {
                    writer.write_event(Event::Start(strip_denied_attributes(&e)?))?;
                }
            }
            Event::Empty(e) => {
                if skip_depth == 0 && !is_denied_tag(e.name().as_ref()) {
                    writer.write_event(Event::Empty(strip_denied_attributes(&e)?))?;
                }
            }
            Event::End(e) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                } else {
                    writer.write_event(Event::End(e))?;
                }
            }
            other => {
                if skip_depth == 0 {
                    writer.write_event(other)?;
                }
            }
        }
        buf.clear();
    }

    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8(bytes)?)
}

fn is_denied_tag(name: &[u8]) -> bool {
    DENIED_TAGS.iter().any(|tag| name.eq_ignore_ascii_case(tag))
}

fn is_denied_attribute(name: &[u8]) -> bool {
    DENIED_ATTRIBUTES
        .iter()
        .any(|attr| name.eq_ignore_ascii_case(attr))
}

fn strip_denied_attributes(e: &BytesStart) -> anyhow::Result<BytesStart<'static>> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut clean = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        if !is_denied_attribute(attr.key.as_ref()) {
            clean.push_attribute(attr);
        }
    }
    Ok(clean)
}
