//! Outgoing INDI commands
//!
//! Builds `new*Vector` value changes along with the `getProperties` and
//! `enableBLOB` requests a subscriber needs. Every attribute and text value
//! is XML escaped.

use std::fmt::Write as _;

use quick_xml::escape::escape;

use crate::error::{IndiError, IndiResult};
use crate::protocol::{BLOB_ALSO, ENABLE_BLOB, GET_PROPERTIES, INDI_PROTOCOL_VERSION, WILDCARD};
use crate::IndiPropertyType;

/// An encoded value change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The `new*Vector` document
    pub xml: String,
    /// One line summary, `device.vector.element=value;element2=value2`
    pub trace: String,
}

/// Encoder for client to server messages
#[derive(Debug, Clone)]
pub struct CommandEncoder {
    protocol_version: String,
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self::new(INDI_PROTOCOL_VERSION)
    }
}

impl CommandEncoder {
    pub fn new(protocol_version: impl Into<String>) -> Self {
        Self {
            protocol_version: protocol_version.into(),
        }
    }

    /// Encode a value change from a kind name, a `device.vector` target and
    /// a flat `element, value, element, value, ...` list
    pub fn encode(&self, kind: &str, target: &str, args: &[&str]) -> IndiResult<Command> {
        let kind = IndiPropertyType::parse(kind)
            .ok_or_else(|| IndiError::InvalidCommand(format!("unknown vector type '{}'", kind)))?;

        if args.is_empty() || args.len() % 2 != 0 {
            return Err(IndiError::InvalidCommand(format!(
                "{} {} needs element/value pairs, got {} argument(s)",
                kind,
                target,
                args.len()
            )));
        }

        let (device, vector) = target
            .rsplit_once('.')
            .filter(|(d, v)| !d.is_empty() && !v.is_empty())
            .ok_or_else(|| {
                IndiError::InvalidCommand(format!("target '{}' is not \"device.vector\"", target))
            })?;

        let pairs: Vec<(&str, &str)> = args.chunks_exact(2).map(|p| (p[0], p[1])).collect();
        self.encode_pairs(kind, device, vector, &pairs)
    }

    /// Encode a value change from element/value pairs
    pub fn encode_pairs(
        &self,
        kind: IndiPropertyType,
        device: &str,
        vector: &str,
        pairs: &[(&str, &str)],
    ) -> IndiResult<Command> {
        if kind == IndiPropertyType::Light {
            return Err(IndiError::InvalidCommand(format!(
                "{}.{} is a Light vector and cannot be set",
                device, vector
            )));
        }
        if pairs.is_empty() {
            return Err(IndiError::InvalidCommand(format!(
                "{}.{} has no elements to set",
                device, vector
            )));
        }
        if let Some((_, value)) = pairs.iter().find(|(name, _)| name.is_empty()) {
            return Err(IndiError::InvalidCommand(format!(
                "{}.{} has an element with no name (value '{}')",
                device, vector, value
            )));
        }

        let kind = kind.as_str();
        let mut xml = format!(
            "<new{}Vector device=\"{}\" name=\"{}\">\n",
            kind,
            escape(device),
            escape(vector)
        );
        let mut trace = format!("{}.{}", device, vector);
        let mut sep = '.';

        for (name, value) in pairs {
            // Writing to a String cannot fail
            let _ = writeln!(
                xml,
                "  <one{kind} name=\"{}\">{}</one{kind}>",
                escape(name),
                escape(value),
            );
            let _ = write!(trace, "{}{}={}", sep, name, value);
            sep = ';';
        }
        let _ = write!(xml, "</new{}Vector>", kind);

        Ok(Command { xml, trace })
    }

    /// `<getProperties>` request. `None` or `*` leaves the filter out.
    pub fn get_properties(&self, device: Option<&str>, name: Option<&str>) -> String {
        format!(
            "<{} version=\"{}\"{}/>",
            GET_PROPERTIES,
            escape(&self.protocol_version),
            filters(device, name)
        )
    }

    /// `<enableBLOB>` opt-in so BLOB vectors are delivered alongside the rest
    pub fn enable_blob(&self, device: Option<&str>, name: Option<&str>) -> String {
        format!(
            "<{tag}{}>{}</{tag}>",
            filters(device, name),
            BLOB_ALSO,
            tag = ENABLE_BLOB
        )
    }
}

fn filters(device: Option<&str>, name: Option<&str>) -> String {
    let mut out = String::new();
    for (attr, value) in [("device", device), ("name", name)] {
        if let Some(value) = value.filter(|v| *v != WILDCARD) {
            let _ = write!(out, " {}=\"{}\"", attr, escape(value));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::parse_frame;
    use crate::property::IndiEvent;
    use crate::IndiOperation;

    #[test]
    fn test_polling_period_command() {
        let cmd = CommandEncoder::default()
            .encode("Number", "Dome Simulator.POLLING_PERIOD", &["PERIOD_MS", "2000"])
            .unwrap();
        assert_eq!(
            cmd.xml,
            "<newNumberVector device=\"Dome Simulator\" name=\"POLLING_PERIOD\">\n  <oneNumber name=\"PERIOD_MS\">2000</oneNumber>\n</newNumberVector>"
        );
        assert_eq!(cmd.trace, "Dome Simulator.POLLING_PERIOD.PERIOD_MS=2000");
    }

    #[test]
    fn test_multiple_pairs_in_order() {
        let cmd = CommandEncoder::default()
            .encode(
                "Number",
                "Telescope.EQUATORIAL_EOD_COORD",
                &["RA", "2 31 49", "DEC", "89 15.846"],
            )
            .unwrap();
        let ra = cmd.xml.find("name=\"RA\"").unwrap();
        let dec = cmd.xml.find("name=\"DEC\"").unwrap();
        assert!(ra < dec);
        assert_eq!(
            cmd.trace,
            "Telescope.EQUATORIAL_EOD_COORD.RA=2 31 49;DEC=89 15.846"
        );
    }

    #[test]
    fn test_argument_validation() {
        let encoder = CommandEncoder::default();
        for args in [&[][..], &["PERIOD_MS"][..], &["A", "1", "B"][..]] {
            let err = encoder.encode("Number", "D.N", args).unwrap_err();
            assert!(matches!(err, IndiError::InvalidCommand(_)), "{:?}", args);
            assert!(err.is_user_facing());
        }
        assert!(encoder.encode("Number", "NoDot", &["A", "1"]).is_err());
        assert!(encoder.encode("Vector", "D.N", &["A", "1"]).is_err());
        assert!(encoder.encode("Light", "D.N", &["A", "Ok"]).is_err());
        assert!(encoder.encode("Text", "D.N", &["", "x"]).is_err());
    }

    #[test]
    fn test_values_escaped() {
        let cmd = CommandEncoder::default()
            .encode("Text", "CCD \"A\".UPLOAD_SETTINGS", &["UPLOAD_DIR", "/tmp/<a&b>"])
            .unwrap();
        assert!(cmd.xml.contains("device=\"CCD &quot;A&quot;\""));
        assert!(cmd.xml.contains(">/tmp/&lt;a&amp;b&gt;</oneText>"));
    }

    #[test]
    fn test_encode_parse_round_trip() {
        let encoder = CommandEncoder::default();
        let cases: [(&str, &str, &[&str]); 4] = [
            ("Number", "Dome Simulator.POLLING_PERIOD", &["PERIOD_MS", "2000"]),
            ("Text", "Camera v2.0.UPLOAD", &["DIR", "/home/<me>", "PREFIX", "a&b"]),
            ("Switch", "Dome Simulator.SIMULATION", &["ENABLE", "On", "DISABLE", "Off"]),
            ("BLOB", "CCD.CCD1", &["CCD1", "QUJD"]),
        ];

        for (kind, target, args) in cases {
            let cmd = encoder.encode(kind, target, args).unwrap();
            let IndiEvent::Vector(v) = parse_frame(&cmd.xml).unwrap() else {
                panic!("{} did not parse as a vector", cmd.xml);
            };
            let (device, vector) = target.rsplit_once('.').unwrap();
            assert_eq!(v.operation, IndiOperation::New);
            assert_eq!(v.kind().as_str(), kind);
            assert_eq!(v.device, device);
            assert_eq!(v.name, vector);

            let pairs: Vec<(String, String)> = v
                .elements()
                .into_iter()
                .map(|e| (e.name.to_string(), e.value.into_owned()))
                .collect();
            let expected: Vec<(String, String)> = args
                .chunks_exact(2)
                .map(|p| (p[0].to_string(), p[1].to_string()))
                .collect();
            assert_eq!(pairs, expected);
        }
    }

    #[test]
    fn test_get_properties() {
        let encoder = CommandEncoder::default();
        assert_eq!(
            encoder.get_properties(Some("Dome Simulator"), Some("SIMULATION")),
            "<getProperties version=\"1.7\" device=\"Dome Simulator\" name=\"SIMULATION\"/>"
        );
        assert_eq!(
            encoder.get_properties(Some("*"), Some("*")),
            "<getProperties version=\"1.7\"/>"
        );
        assert_eq!(
            encoder.get_properties(Some("CCD"), None),
            "<getProperties version=\"1.7\" device=\"CCD\"/>"
        );
    }

    #[test]
    fn test_enable_blob() {
        let encoder = CommandEncoder::default();
        assert_eq!(
            encoder.enable_blob(Some("CCD Simulator"), Some("CCD1")),
            "<enableBLOB device=\"CCD Simulator\" name=\"CCD1\">Also</enableBLOB>"
        );
        assert_eq!(encoder.enable_blob(None, None), "<enableBLOB>Also</enableBLOB>");
    }
}
