//! Flattening of complete INDI elements into typed records

use std::collections::BTreeMap;
use std::fmt::Display;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::classify::{classify, root_tag, Classification};
use crate::error::{IndiError, IndiResult};
use crate::property::{
    BlobElement, BlobPayload, DeleteNotice, IndiEvent, LightElement, MessageNotice,
    NumberElement, PropertyVector, SwitchElement, SwitchState, TextElement, VectorBody,
};
use crate::{IndiOperation, IndiPermission, IndiPropertyState, IndiPropertyType, IndiSwitchRule};

/// One XML element with its attributes and trimmed text
#[derive(Debug, Default)]
struct RawElement {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
}

impl RawElement {
    fn attr(&self, key: &str) -> Option<String> {
        self.attrs.get(key).cloned()
    }
}

/// Classify and flatten one complete element
pub fn parse_frame(xml: &str) -> IndiResult<IndiEvent> {
    let tag = root_tag(xml).ok_or_else(|| IndiError::ParseError {
        device: None,
        name: None,
        message: "no element found".to_string(),
    })?;
    let class = classify(tag)?;
    flatten(&class, xml)
}

/// Flatten an already classified element into an [`IndiEvent`]
pub fn flatten(class: &Classification, xml: &str) -> IndiResult<IndiEvent> {
    let (root, children) = read_tree(xml)?;

    match class.operation {
        IndiOperation::Delete => {
            let device = required(&root, "device")?;
            Ok(IndiEvent::Delete(DeleteNotice {
                device,
                name: root.attr("name").filter(|n| !n.is_empty()),
                timestamp: root.attr("timestamp"),
                message: root.attr("message"),
            }))
        }
        IndiOperation::Message => Ok(IndiEvent::Message(MessageNotice {
            device: root.attr("device"),
            timestamp: root.attr("timestamp"),
            message: root.attr("message").unwrap_or_else(|| root.text.clone()),
        })),
        operation => {
            let kind = class.kind.ok_or_else(|| IndiError::UnknownElement {
                tag: root.tag.clone(),
            })?;
            flatten_vector(operation, kind, root, children).map(IndiEvent::Vector)
        }
    }
}

fn flatten_vector(
    operation: IndiOperation,
    kind: IndiPropertyType,
    root: RawElement,
    children: Vec<RawElement>,
) -> IndiResult<PropertyVector> {
    let device = required(&root, "device")?;
    let name = required(&root, "name")?;

    let state = root.attrs.get("state").and_then(|s| {
        let state = IndiPropertyState::parse(s);
        if state.is_none() {
            tracing::warn!("Unknown state '{}' for {}.{}", s, device, name);
        }
        state
    });
    let perm = root.attrs.get("perm").and_then(|p| IndiPermission::parse(p));
    let rule = root.attrs.get("rule").and_then(|r| IndiSwitchRule::parse(r));

    // Children without a name cannot be addressed and are skipped
    let children: Vec<RawElement> = children
        .into_iter()
        .filter(|c| {
            let named = c.attrs.contains_key("name");
            if !named {
                tracing::debug!("Skipping unnamed <{}> in {}.{}", c.tag, device, name);
            }
            named
        })
        .collect();

    let body = match kind {
        IndiPropertyType::Number => VectorBody::Number {
            perm,
            elements: children.into_iter().map(number_element).collect(),
        },
        IndiPropertyType::Text => VectorBody::Text {
            perm,
            elements: children
                .into_iter()
                .map(|c| TextElement {
                    name: c.attr("name").unwrap_or_default(),
                    label: c.attr("label"),
                    value: c.text,
                })
                .collect(),
        },
        IndiPropertyType::Switch => VectorBody::Switch {
            perm,
            rule,
            elements: children
                .into_iter()
                .map(|c| {
                    let value = SwitchState::parse(&c.text).unwrap_or_else(|| {
                        tracing::warn!(
                            "Invalid switch value '{}' for {}.{}, treating as Off",
                            c.text,
                            device,
                            name
                        );
                        SwitchState::Off
                    });
                    SwitchElement {
                        name: c.attr("name").unwrap_or_default(),
                        label: c.attr("label"),
                        value,
                    }
                })
                .collect(),
        },
        IndiPropertyType::Light => VectorBody::Light {
            elements: children
                .into_iter()
                .map(|c| LightElement {
                    name: c.attr("name").unwrap_or_default(),
                    label: c.attr("label"),
                    value: IndiPropertyState::parse(&c.text).unwrap_or(IndiPropertyState::Idle),
                })
                .collect(),
        },
        IndiPropertyType::Blob => VectorBody::Blob {
            perm,
            elements: children
                .into_iter()
                .map(|c| blob_element(&device, &name, c))
                .collect(),
        },
    };

    Ok(PropertyVector {
        label: root.attr("label"),
        group: root.attr("group"),
        state,
        timeout: root.attr("timeout"),
        timestamp: root.attr("timestamp"),
        message: root.attr("message"),
        operation,
        attributes: root.attrs,
        body,
        device,
        name,
    })
}

fn number_element(c: RawElement) -> NumberElement {
    let float = |key: &str| c.attrs.get(key).and_then(|v| v.trim().parse::<f64>().ok());
    NumberElement {
        name: c.attr("name").unwrap_or_default(),
        label: c.attr("label"),
        format: c.attr("format"),
        min: float("min"),
        max: float("max"),
        step: float("step"),
        value: c.text.parse::<f64>().ok(),
        raw: c.text,
    }
}

fn blob_element(device: &str, vector: &str, c: RawElement) -> BlobElement {
    let name = c.attr("name").unwrap_or_default();
    let format = c.attr("format");
    let size = c.attrs.get("size").and_then(|s| s.trim().parse::<u64>().ok());

    let cleaned: String = c
        .text
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '/' | '='))
        .collect();

    let (payload, detected_format) = if cleaned.is_empty() {
        (BlobPayload::Empty, None)
    } else {
        match BASE64.decode(cleaned.as_bytes()) {
            Ok(data) => {
                tracing::debug!(
                    "BLOB received for {}.{}.{}: {} bytes",
                    device,
                    vector,
                    name,
                    data.len()
                );
                let detected = detect_blob_format(format.as_deref().unwrap_or(""), &data);
                (BlobPayload::Bytes(data), detected)
            }
            Err(e) => {
                let err = IndiError::BlobDecode {
                    element: format!("{}.{}.{}", device, vector, name),
                    message: e.to_string(),
                };
                tracing::warn!("{}", err);
                (BlobPayload::DecodeError(err.to_string()), None)
            }
        }
    };

    BlobElement {
        name,
        label: c.attr("label"),
        format,
        size,
        detected_format,
        payload,
    }
}

/// Detect a BLOB's format from its magic bytes
fn detect_blob_format(declared: &str, data: &[u8]) -> Option<String> {
    let detected = if data.starts_with(b"SIMPLE") {
        ".fits"
    } else if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        ".png"
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        ".jpeg"
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        ".webp"
    } else if data.starts_with(&[0x1F, 0x8B]) {
        ".gz"
    } else if data.starts_with(&[0x50, 0x4B]) {
        ".zip"
    } else {
        return None;
    };

    if !declared.is_empty() && !declared.starts_with(detected) {
        tracing::debug!(
            "BLOB format mismatch: declared '{}', detected '{}'",
            declared,
            detected
        );
    }
    Some(detected.to_string())
}

fn required(root: &RawElement, key: &str) -> IndiResult<String> {
    root.attr(key).ok_or_else(|| {
        parse_error(
            &root.attrs,
            format!("<{}> is missing the '{}' attribute", root.tag, key),
        )
    })
}

fn parse_error(attrs: &BTreeMap<String, String>, message: impl Display) -> IndiError {
    IndiError::ParseError {
        device: attrs.get("device").cloned(),
        name: attrs.get("name").cloned(),
        message: message.to_string(),
    }
}

/// Attributes and tag name of a start tag. On failure, returns the
/// attributes read so far for error context.
fn raw_element(e: &BytesStart) -> Result<RawElement, (BTreeMap<String, String>, String)> {
    let mut element = RawElement {
        tag: String::from_utf8_lossy(e.name().as_ref()).to_string(),
        ..Default::default()
    };
    for attr in e.attributes() {
        let attr = match attr {
            Ok(a) => a,
            Err(err) => return Err((element.attrs, err.to_string())),
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = match attr.unescape_value() {
            Ok(v) => v.to_string(),
            Err(err) => return Err((element.attrs, err.to_string())),
        };
        element.attrs.insert(key, value);
    }
    Ok(element)
}

/// Read the root element and its direct children
fn read_tree(xml: &str) -> IndiResult<(RawElement, Vec<RawElement>)> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut root: Option<RawElement> = None;
    let mut child: Option<RawElement> = None;
    let mut children = Vec::new();
    let mut depth = 0usize;
    let mut closed = false;

    let empty = BTreeMap::new();
    let context = |root: &Option<RawElement>| -> BTreeMap<String, String> {
        root.as_ref().map(|r| r.attrs.clone()).unwrap_or_default()
    };

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => return Err(parse_error(&context(&root), e)),
        };

        match event {
            Event::Start(e) => {
                let element = raw_element(&e).map_err(|(partial, msg)| {
                    let attrs = if depth == 0 { partial } else { context(&root) };
                    parse_error(&attrs, msg)
                })?;
                match depth {
                    0 => root = Some(element),
                    1 => child = Some(element),
                    _ => {}
                }
                depth += 1;
            }
            Event::Empty(e) => {
                let element = raw_element(&e).map_err(|(partial, msg)| {
                    let attrs = if depth == 0 { partial } else { context(&root) };
                    parse_error(&attrs, msg)
                })?;
                match depth {
                    0 => {
                        root = Some(element);
                        closed = true;
                        break;
                    }
                    1 => children.push(element),
                    _ => {}
                }
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|err| parse_error(&context(&root), err))?;
                append_text(depth, &mut root, &mut child, &text);
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).to_string();
                append_text(depth, &mut root, &mut child, &text);
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                match depth {
                    0 => {
                        closed = true;
                        break;
                    }
                    1 => {
                        if let Some(c) = child.take() {
                            children.push(c);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let Some(mut root) = root else {
        return Err(parse_error(&empty, "no element found"));
    };
    if !closed {
        return Err(parse_error(
            &root.attrs,
            format!("unexpected end of input inside <{}>", root.tag),
        ));
    }

    root.text = root.text.trim().to_string();
    for c in &mut children {
        c.text = c.text.trim().to_string();
    }
    Ok((root, children))
}

fn append_text(
    depth: usize,
    root: &mut Option<RawElement>,
    child: &mut Option<RawElement>,
    text: &str,
) {
    let target = match depth {
        1 => root.as_mut(),
        2 => child.as_mut(),
        _ => None,
    };
    if let Some(element) = target {
        element.text.push_str(text);
    }
}
