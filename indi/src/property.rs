//! Typed INDI property records
//!
//! A [`PropertyVector`] is one flattened vector element. Its elements live in
//! a [`VectorBody`] that is tagged by kind, so a Number vector can only hold
//! [`NumberElement`]s and the permission / rule fields only exist where INDI
//! defines them.

use std::borrow::Cow;
use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{IndiOperation, IndiPermission, IndiPropertyState, IndiPropertyType, IndiSwitchRule};

/// Switch element state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchState::On => "On",
            SwitchState::Off => "Off",
        }
    }

    /// Parse `On` / `Off`, ignoring case and surrounding whitespace
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("on") {
            Some(SwitchState::On)
        } else if s.eq_ignore_ascii_case("off") {
            Some(SwitchState::Off)
        } else {
            None
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, SwitchState::On)
    }
}

impl From<bool> for SwitchState {
    fn from(on: bool) -> Self {
        if on {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }
}

/// Number element
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberElement {
    pub name: String,
    pub label: Option<String>,
    /// printf-style format (`%g`, `%010.6m`, ...)
    pub format: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    /// Parsed value, `None` when the text is not a plain float
    pub value: Option<f64>,
    /// Trimmed element text as received
    pub raw: String,
}

/// Text element
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextElement {
    pub name: String,
    pub label: Option<String>,
    pub value: String,
}

/// Switch element
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchElement {
    pub name: String,
    pub label: Option<String>,
    pub value: SwitchState,
}

/// Light element
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightElement {
    pub name: String,
    pub label: Option<String>,
    pub value: IndiPropertyState,
}

/// Decoded BLOB content
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobPayload {
    /// No content (definitions, or a server that sent no data)
    Empty,
    #[serde(serialize_with = "serialize_base64")]
    Bytes(Vec<u8>),
    /// The text could not be decoded; the rest of the vector is intact
    DecodeError(String),
}

impl BlobPayload {
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            BlobPayload::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().map_or(0, <[u8]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
}

/// BLOB element
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlobElement {
    pub name: String,
    pub label: Option<String>,
    /// Declared format (`.fits`, `.fits.z`, ...)
    pub format: Option<String>,
    /// Declared size in bytes
    pub size: Option<u64>,
    /// Format recognized from the payload's magic bytes
    pub detected_format: Option<String>,
    pub payload: BlobPayload,
}

/// Elements of a vector, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum VectorBody {
    Number {
        perm: Option<IndiPermission>,
        elements: Vec<NumberElement>,
    },
    Text {
        perm: Option<IndiPermission>,
        elements: Vec<TextElement>,
    },
    Switch {
        perm: Option<IndiPermission>,
        rule: Option<IndiSwitchRule>,
        elements: Vec<SwitchElement>,
    },
    Light {
        elements: Vec<LightElement>,
    },
    #[serde(rename = "BLOB")]
    Blob {
        perm: Option<IndiPermission>,
        elements: Vec<BlobElement>,
    },
}

impl VectorBody {
    /// Empty body of the given kind
    pub fn empty(kind: IndiPropertyType) -> Self {
        match kind {
            IndiPropertyType::Number => VectorBody::Number {
                perm: None,
                elements: Vec::new(),
            },
            IndiPropertyType::Text => VectorBody::Text {
                perm: None,
                elements: Vec::new(),
            },
            IndiPropertyType::Switch => VectorBody::Switch {
                perm: None,
                rule: None,
                elements: Vec::new(),
            },
            IndiPropertyType::Light => VectorBody::Light {
                elements: Vec::new(),
            },
            IndiPropertyType::Blob => VectorBody::Blob {
                perm: None,
                elements: Vec::new(),
            },
        }
    }

    pub fn kind(&self) -> IndiPropertyType {
        match self {
            VectorBody::Number { .. } => IndiPropertyType::Number,
            VectorBody::Text { .. } => IndiPropertyType::Text,
            VectorBody::Switch { .. } => IndiPropertyType::Switch,
            VectorBody::Light { .. } => IndiPropertyType::Light,
            VectorBody::Blob { .. } => IndiPropertyType::Blob,
        }
    }

    /// Permission, absent for Light vectors and for Set updates
    pub fn perm(&self) -> Option<IndiPermission> {
        match self {
            VectorBody::Number { perm, .. }
            | VectorBody::Text { perm, .. }
            | VectorBody::Switch { perm, .. }
            | VectorBody::Blob { perm, .. } => *perm,
            VectorBody::Light { .. } => None,
        }
    }

    pub fn rule(&self) -> Option<IndiSwitchRule> {
        match self {
            VectorBody::Switch { rule, .. } => *rule,
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            VectorBody::Number { elements, .. } => elements.len(),
            VectorBody::Text { elements, .. } => elements.len(),
            VectorBody::Switch { elements, .. } => elements.len(),
            VectorBody::Light { elements } => elements.len(),
            VectorBody::Blob { elements, .. } => elements.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read-only, kind independent view of one element
#[derive(Debug, Clone, PartialEq)]
pub struct ElementView<'a> {
    pub name: &'a str,
    pub label: Option<&'a str>,
    /// Value as it appears on the wire (BLOB payloads re-encoded as base64)
    pub value: Cow<'a, str>,
}

/// A flattened property vector
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyVector {
    pub device: String,
    pub name: String,
    pub label: Option<String>,
    pub group: Option<String>,
    pub state: Option<IndiPropertyState>,
    pub timeout: Option<String>,
    pub timestamp: Option<String>,
    pub message: Option<String>,
    pub operation: IndiOperation,
    /// Every top-level attribute value, verbatim, keyed and sorted by name
    pub attributes: BTreeMap<String, String>,
    #[serde(flatten)]
    pub body: VectorBody,
}

impl PropertyVector {
    /// Empty vector with only identity filled in
    pub fn new(
        device: impl Into<String>,
        name: impl Into<String>,
        operation: IndiOperation,
        kind: IndiPropertyType,
    ) -> Self {
        Self {
            device: device.into(),
            name: name.into(),
            label: None,
            group: None,
            state: None,
            timeout: None,
            timestamp: None,
            message: None,
            operation,
            attributes: BTreeMap::new(),
            body: VectorBody::empty(kind),
        }
    }

    /// Routing and availability key, `device.name`
    pub fn key(&self) -> String {
        format!("{}.{}", self.device, self.name)
    }

    pub fn kind(&self) -> IndiPropertyType {
        self.body.kind()
    }

    pub fn perm(&self) -> Option<IndiPermission> {
        self.body.perm()
    }

    pub fn rule(&self) -> Option<IndiSwitchRule> {
        self.body.rule()
    }

    /// Elements in document order
    pub fn elements(&self) -> Vec<ElementView<'_>> {
        fn view<'a>(name: &'a str, label: &'a Option<String>, value: Cow<'a, str>) -> ElementView<'a> {
            ElementView {
                name,
                label: label.as_deref(),
                value,
            }
        }

        match &self.body {
            VectorBody::Number { elements, .. } => elements
                .iter()
                .map(|e| view(&e.name, &e.label, Cow::Borrowed(e.raw.as_str())))
                .collect(),
            VectorBody::Text { elements, .. } => elements
                .iter()
                .map(|e| view(&e.name, &e.label, Cow::Borrowed(e.value.as_str())))
                .collect(),
            VectorBody::Switch { elements, .. } => elements
                .iter()
                .map(|e| view(&e.name, &e.label, Cow::Borrowed(e.value.as_str())))
                .collect(),
            VectorBody::Light { elements } => elements
                .iter()
                .map(|e| view(&e.name, &e.label, Cow::Borrowed(e.value.as_str())))
                .collect(),
            VectorBody::Blob { elements, .. } => elements
                .iter()
                .map(|e| {
                    let value = e
                        .payload
                        .bytes()
                        .map(|b| Cow::Owned(BASE64.encode(b)))
                        .unwrap_or(Cow::Borrowed(""));
                    view(&e.name, &e.label, value)
                })
                .collect(),
        }
    }

    /// Value of one element by name
    pub fn value_of(&self, element: &str) -> Option<Cow<'_, str>> {
        self.elements()
            .into_iter()
            .find(|e| e.name == element)
            .map(|e| e.value)
    }

    /// Name of the first switch that is On
    pub fn active_switch(&self) -> Option<&str> {
        match &self.body {
            VectorBody::Switch { elements, .. } => elements
                .iter()
                .find(|e| e.value.is_on())
                .map(|e| e.name.as_str()),
            _ => None,
        }
    }

    /// Flat keyed view: top-level attributes, then `element` and
    /// `element.attr` entries for every child
    pub fn flat_view(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for (key, value) in &self.attributes {
            map.insert(key.clone(), Value::String(value.clone()));
        }
        map.insert("device".into(), self.device.clone().into());
        map.insert("name".into(), self.name.clone().into());
        map.insert("kind".into(), self.kind().as_str().into());

        let mut put = |element: &str, attr: &str, value: Value| {
            map.insert(format!("{}.{}", element, attr), value);
        };

        match &self.body {
            VectorBody::Number { elements, .. } => {
                for e in elements {
                    if let Some(label) = &e.label {
                        put(&e.name, "label", label.clone().into());
                    }
                    if let Some(format) = &e.format {
                        put(&e.name, "format", format.clone().into());
                    }
                    for (attr, value) in [("min", e.min), ("max", e.max), ("step", e.step)] {
                        if let Some(v) = value {
                            put(&e.name, attr, number(v));
                        }
                    }
                }
            }
            VectorBody::Blob { elements, .. } => {
                for e in elements {
                    if let Some(label) = &e.label {
                        put(&e.name, "label", label.clone().into());
                    }
                    if let Some(format) = &e.format {
                        put(&e.name, "format", format.clone().into());
                    }
                    if let Some(size) = e.size {
                        put(&e.name, "size", size.into());
                    }
                }
            }
            _ => {
                for e in self.elements() {
                    if let Some(label) = e.label {
                        put(e.name, "label", label.into());
                    }
                }
            }
        }

        match &self.body {
            VectorBody::Number { elements, .. } => {
                for e in elements {
                    let value = e.value.map(number).unwrap_or_else(|| e.raw.clone().into());
                    map.insert(e.name.clone(), value);
                }
            }
            _ => {
                for e in self.elements() {
                    map.insert(e.name.to_string(), Value::String(e.value.into_owned()));
                }
            }
        }
        map
    }
}

fn number(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// `<delProperty>` notice
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteNotice {
    pub device: String,
    /// `None` deletes every vector of the device
    pub name: Option<String>,
    pub timestamp: Option<String>,
    pub message: Option<String>,
}

/// `<message>` notice
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageNotice {
    pub device: Option<String>,
    pub timestamp: Option<String>,
    pub message: String,
}

/// One parsed top-level element
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndiEvent {
    Vector(PropertyVector),
    Delete(DeleteNotice),
    Message(MessageNotice),
}

impl IndiEvent {
    pub fn operation(&self) -> IndiOperation {
        match self {
            IndiEvent::Vector(v) => v.operation,
            IndiEvent::Delete(_) => IndiOperation::Delete,
            IndiEvent::Message(_) => IndiOperation::Message,
        }
    }

    pub fn device(&self) -> Option<&str> {
        match self {
            IndiEvent::Vector(v) => Some(&v.device),
            IndiEvent::Delete(d) => Some(&d.device),
            IndiEvent::Message(m) => m.device.as_deref(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            IndiEvent::Vector(v) => Some(&v.name),
            IndiEvent::Delete(d) => d.name.as_deref(),
            IndiEvent::Message(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<&PropertyVector> {
        match self {
            IndiEvent::Vector(v) => Some(v),
            _ => None,
        }
    }
}
