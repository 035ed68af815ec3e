//! Tag name classification
//!
//! Maps a top-level tag name to the protocol operation and vector kind it
//! carries. Only the INDI vocabulary is accepted; anything else is an
//! [`IndiError::UnknownElement`].

use crate::error::{IndiError, IndiResult};
use crate::protocol::{DEL_PROPERTY, MESSAGE, VECTOR_SUFFIX};
use crate::{IndiOperation, IndiPropertyType};

/// Operation and (for vectors) kind of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub operation: IndiOperation,
    pub kind: Option<IndiPropertyType>,
}

impl Classification {
    /// Tag name of the child elements for this vector (`defSwitch`, `oneNumber`)
    pub fn child_tag(&self) -> Option<String> {
        let kind = self.kind?;
        let prefix = match self.operation {
            IndiOperation::Definition => "def",
            IndiOperation::Set | IndiOperation::New => "one",
            _ => return None,
        };
        Some(format!("{}{}", prefix, kind.as_str()))
    }
}

/// Classify a top-level tag name
pub fn classify(tag: &str) -> IndiResult<Classification> {
    let unknown = || IndiError::UnknownElement {
        tag: tag.to_string(),
    };

    match tag {
        DEL_PROPERTY => {
            return Ok(Classification {
                operation: IndiOperation::Delete,
                kind: None,
            })
        }
        MESSAGE => {
            return Ok(Classification {
                operation: IndiOperation::Message,
                kind: None,
            })
        }
        _ => {}
    }

    let body = tag.strip_suffix(VECTOR_SUFFIX).ok_or_else(unknown)?;
    if body.len() < 3 || !body.is_char_boundary(3) {
        return Err(unknown());
    }
    let (prefix, kind) = body.split_at(3);

    let operation = match prefix {
        "def" => IndiOperation::Definition,
        "set" => IndiOperation::Set,
        "new" => IndiOperation::New,
        "get" => IndiOperation::Get,
        _ => return Err(unknown()),
    };
    // Only the exact wire spelling, so `defBlobVector` is rejected
    let kind = IndiPropertyType::ALL
        .into_iter()
        .find(|k| k.as_str() == kind)
        .ok_or_else(unknown)?;

    Ok(Classification {
        operation,
        kind: Some(kind),
    })
}

/// Classify a complete element by its root tag
pub fn classify_element(xml: &str) -> IndiResult<Classification> {
    classify(root_tag(xml).unwrap_or_default())
}

/// Name of the first start tag in `xml`, skipping declarations and comments
pub(crate) fn root_tag(xml: &str) -> Option<&str> {
    let mut rest = xml;
    loop {
        let start = rest.find('<')?;
        rest = &rest[start + 1..];
        if rest.starts_with('?') || rest.starts_with('!') || rest.starts_with('/') {
            continue;
        }
        let end = rest
            .find(|c: char| c.is_ascii_whitespace() || c == '/' || c == '>')
            .unwrap_or(rest.len());
        return Some(&rest[..end]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_all_vectors() {
        let ops = [
            ("def", IndiOperation::Definition),
            ("set", IndiOperation::Set),
            ("new", IndiOperation::New),
            ("get", IndiOperation::Get),
        ];
        for (prefix, op) in ops {
            for kind in IndiPropertyType::ALL {
                let tag = format!("{}{}Vector", prefix, kind.as_str());
                let c = classify(&tag).unwrap();
                assert_eq!(c.operation, op, "{}", tag);
                assert_eq!(c.kind, Some(kind), "{}", tag);
            }
        }
    }

    #[test]
    fn test_classify_notices() {
        let c = classify("delProperty").unwrap();
        assert_eq!(c.operation, IndiOperation::Delete);
        assert_eq!(c.kind, None);

        let c = classify("message").unwrap();
        assert_eq!(c.operation, IndiOperation::Message);
        assert_eq!(c.kind, None);
    }

    #[test]
    fn test_classify_rejects_unknown() {
        for tag in [
            "defFooVector",
            "defBlobVector",
            "Vector",
            "xyzNumberVector",
            "getProperties",
            "enableBLOB",
            "defNumber",
            "",
        ] {
            match classify(tag) {
                Err(IndiError::UnknownElement { tag: t }) => assert_eq!(t, tag),
                other => panic!("{} classified as {:?}", tag, other),
            }
        }
    }

    #[test]
    fn test_classify_element_root() {
        let xml = r#"<?xml version="1.0"?><setSwitchVector device="D" name="N"><oneSwitch name="A">On</oneSwitch></setSwitchVector>"#;
        let c = classify_element(xml).unwrap();
        assert_eq!(c.operation, IndiOperation::Set);
        assert_eq!(c.kind, Some(IndiPropertyType::Switch));
        assert_eq!(c.child_tag().as_deref(), Some("oneSwitch"));

        let c = classify_element(r#"<delProperty device="D"/>"#).unwrap();
        assert_eq!(c.operation, IndiOperation::Delete);
        assert!(c.child_tag().is_none());

        assert!(classify_element("no markup").is_err());
    }

    #[test]
    fn test_child_tags() {
        let c = classify("defBLOBVector").unwrap();
        assert_eq!(c.child_tag().as_deref(), Some("defBLOB"));
        let c = classify("getNumberVector").unwrap();
        assert_eq!(c.child_tag(), None);
    }
}
