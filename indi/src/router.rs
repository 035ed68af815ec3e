//! Pattern subscriptions and the availability table

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{IndiError, IndiResult};
use crate::property::IndiEvent;
use crate::protocol::WILDCARD;

/// What a subscriber receives
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    pub event: &'a IndiEvent,
    /// Pattern the event was routed through
    pub pattern: &'a PropertyPattern,
    /// Whether the vector may be rendered. Notices that are not tied to a
    /// single vector are always deliverable.
    pub available: bool,
}

/// Subscriber callback
pub type PropertyCallback = Box<dyn for<'a> FnMut(&Delivery<'a>) + Send>;

/// `device.name`, `device.*` or `*.*`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyPattern {
    pub device: String,
    pub name: String,
}

impl PropertyPattern {
    /// Parse `device.name`. The split is on the last `.`, so device names
    /// containing dots are fine.
    pub fn parse(pattern: &str) -> IndiResult<Self> {
        let (device, name) = pattern
            .rsplit_once('.')
            .ok_or_else(|| IndiError::InvalidPattern(pattern.to_string()))?;
        if device.is_empty() || name.is_empty() {
            return Err(IndiError::InvalidPattern(pattern.to_string()));
        }
        if device == WILDCARD && name != WILDCARD {
            // `*.NAME` has no defined meaning
            return Err(IndiError::InvalidPattern(pattern.to_string()));
        }
        Ok(Self {
            device: device.to_string(),
            name: name.to_string(),
        })
    }

    pub fn exact(device: &str, name: &str) -> Self {
        Self {
            device: device.to_string(),
            name: name.to_string(),
        }
    }

    pub fn all() -> Self {
        Self::exact(WILDCARD, WILDCARD)
    }

    /// Device filter for `getProperties`, `None` for every device
    pub fn device_filter(&self) -> Option<&str> {
        (self.device != WILDCARD).then_some(self.device.as_str())
    }

    /// Vector filter for `getProperties`, `None` for every vector
    pub fn name_filter(&self) -> Option<&str> {
        (self.name != WILDCARD).then_some(self.name.as_str())
    }

    /// Whether a device belongs to this pattern's scope
    pub fn covers_device(&self, device: &str) -> bool {
        self.device == WILDCARD || self.device == device
    }

    pub fn matches(&self, device: &str, name: &str) -> bool {
        self.covers_device(device) && (self.name == WILDCARD || self.name == name)
    }
}

impl fmt::Display for PropertyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.device, self.name)
    }
}

/// Rendering eligibility of a vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Availability {
    /// Never marked
    #[default]
    Unknown,
    Available,
    /// Explicitly left out (custom layout has no slot for it)
    Omitted,
}

struct Subscription {
    pattern: PropertyPattern,
    callback: PropertyCallback,
}

/// Routes events to at most one subscriber each
#[derive(Default)]
pub struct Router {
    subscriptions: BTreeMap<String, Subscription>,
    availability: HashMap<String, Availability>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("patterns", &self.subscriptions.keys().collect::<Vec<_>>())
            .field("availability", &self.availability.len())
            .finish()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the callback for `pattern`, replacing any previous one
    pub fn register(&mut self, pattern: &str, callback: PropertyCallback) -> IndiResult<PropertyPattern> {
        let pattern = PropertyPattern::parse(pattern)?;
        let key = pattern.to_string();
        if self
            .subscriptions
            .insert(
                key.clone(),
                Subscription {
                    pattern: pattern.clone(),
                    callback,
                },
            )
            .is_some()
        {
            tracing::debug!("Replaced subscription for {}", key);
        }
        Ok(pattern)
    }

    /// Remove a subscription; returns whether one existed
    pub fn unregister(&mut self, pattern: &str) -> bool {
        match PropertyPattern::parse(pattern) {
            Ok(p) => self.subscriptions.remove(&p.to_string()).is_some(),
            Err(_) => false,
        }
    }

    /// Registered patterns, sorted
    pub fn patterns(&self) -> Vec<PropertyPattern> {
        self.subscriptions
            .values()
            .map(|s| s.pattern.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Subscriber key for a vector: `device.name`, then `device.*`, then `*.*`
    pub fn lookup(&self, device: &str, name: &str) -> Option<&PropertyPattern> {
        [
            format!("{}.{}", device, name),
            format!("{}.{}", device, WILDCARD),
            format!("{}.{}", WILDCARD, WILDCARD),
        ]
        .iter()
        .find_map(|key| self.subscriptions.get(key))
        .map(|s| &s.pattern)
    }

    /// Subscriber for a notice not tied to one vector: `device.*`, `*.*`,
    /// then the first exact pattern of the device
    fn lookup_scope(&self, device: Option<&str>) -> Option<String> {
        let all = format!("{}.{}", WILDCARD, WILDCARD);
        match device {
            Some(device) => {
                let wildcard = format!("{}.{}", device, WILDCARD);
                [wildcard, all]
                    .into_iter()
                    .find(|key| self.subscriptions.contains_key(key))
                    .or_else(|| {
                        self.subscriptions
                            .iter()
                            .find(|(_, s)| s.pattern.device == device)
                            .map(|(key, _)| key.clone())
                    })
            }
            None => {
                if self.subscriptions.contains_key(&all) {
                    Some(all)
                } else {
                    self.subscriptions.keys().next().cloned()
                }
            }
        }
    }

    /// Deliver an event to its subscriber. Returns false when nobody wants it.
    pub fn dispatch(&mut self, event: &IndiEvent) -> bool {
        let (key, available) = match (event.device(), event.name()) {
            (Some(device), Some(name)) => {
                let mut key = self.lookup(device, name).map(|p| p.to_string());
                // A named delete still reaches whoever watches the device
                if key.is_none() && matches!(event, IndiEvent::Delete(_)) {
                    key = self.lookup_scope(Some(device));
                }
                (key, self.is_available(device, name))
            }
            (device, _) => (self.lookup_scope(device), true),
        };

        let subscription = match key {
            Some(key) => self.subscriptions.get_mut(&key),
            None => None,
        };
        let Some(subscription) = subscription else {
            tracing::debug!(
                "No subscriber for {:?} {}.{}",
                event.operation(),
                event.device().unwrap_or("*"),
                event.name().unwrap_or("*")
            );
            return false;
        };

        let delivery = Delivery {
            event,
            pattern: &subscription.pattern,
            available,
        };
        (subscription.callback)(&delivery);
        true
    }

    /// Mark a vector as rendered (`omit = false`) or deliberately left out
    pub fn set_available(&mut self, device: &str, name: &str, omit: bool) {
        let state = if omit {
            Availability::Omitted
        } else {
            Availability::Available
        };
        self.availability.insert(format!("{}.{}", device, name), state);
    }

    pub fn is_available(&self, device: &str, name: &str) -> bool {
        self.availability(device, name) == Availability::Available
    }

    pub fn availability(&self, device: &str, name: &str) -> Availability {
        self.availability
            .get(&format!("{}.{}", device, name))
            .copied()
            .unwrap_or_default()
    }

    /// Forget every availability mark
    pub fn clear_availability(&mut self) {
        self.availability.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{DeleteNotice, MessageNotice, PropertyVector};
    use crate::{IndiOperation, IndiPropertyType};
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, tag: &'static str) -> PropertyCallback {
        let log = log.clone();
        Box::new(move |d: &Delivery<'_>| {
            log.lock().unwrap().push(format!(
                "{}:{}.{}:{}",
                tag,
                d.event.device().unwrap_or("-"),
                d.event.name().unwrap_or("-"),
                d.available
            ));
        })
    }

    fn vector(device: &str, name: &str) -> IndiEvent {
        IndiEvent::Vector(PropertyVector::new(
            device,
            name,
            IndiOperation::Set,
            IndiPropertyType::Number,
        ))
    }

    #[test]
    fn test_pattern_parse() {
        let p = PropertyPattern::parse("Dome Simulator.SIMULATION").unwrap();
        assert_eq!(p.device, "Dome Simulator");
        assert_eq!(p.name, "SIMULATION");
        assert_eq!(p.to_string(), "Dome Simulator.SIMULATION");

        let p = PropertyPattern::parse("Camera v2.0.CCD_EXPOSURE").unwrap();
        assert_eq!(p.device, "Camera v2.0");
        assert_eq!(p.name, "CCD_EXPOSURE");

        let p = PropertyPattern::parse("*.*").unwrap();
        assert_eq!(p.device_filter(), None);
        assert_eq!(p.name_filter(), None);

        for bad in ["nodot", ".NAME", "DEV.", "*.NAME"] {
            assert!(PropertyPattern::parse(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_subscription_precedence() {
        let log: Log = Arc::default();
        let mut router = Router::new();
        router.register("D.N", recorder(&log, "exact")).unwrap();
        router.register("D.*", recorder(&log, "device")).unwrap();
        router.register("*.*", recorder(&log, "all")).unwrap();

        assert!(router.dispatch(&vector("D", "N")));
        assert!(router.dispatch(&vector("D", "M")));
        assert!(router.dispatch(&vector("E", "X")));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["exact:D.N:false", "device:D.M:false", "all:E.X:false"]
        );
    }

    #[test]
    fn test_no_subscriber_drops() {
        let log: Log = Arc::default();
        let mut router = Router::new();
        router.register("D.N", recorder(&log, "exact")).unwrap();
        assert!(!router.dispatch(&vector("D", "M")));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_register_replaces() {
        let log: Log = Arc::default();
        let mut router = Router::new();
        router.register("D.N", recorder(&log, "first")).unwrap();
        router.register("D.N", recorder(&log, "second")).unwrap();
        assert_eq!(router.len(), 1);

        router.dispatch(&vector("D", "N"));
        assert_eq!(*log.lock().unwrap(), vec!["second:D.N:false"]);
    }

    #[test]
    fn test_unregister() {
        let log: Log = Arc::default();
        let mut router = Router::new();
        router.register("D.*", recorder(&log, "device")).unwrap();
        assert!(router.unregister("D.*"));
        assert!(!router.unregister("D.*"));
        assert!(router.is_empty());
        assert!(!router.dispatch(&vector("D", "N")));
    }

    #[test]
    fn test_message_routed_to_device_scope() {
        let log: Log = Arc::default();
        let mut router = Router::new();
        router.register("D.N", recorder(&log, "exact")).unwrap();

        let message = IndiEvent::Message(MessageNotice {
            device: Some("D".into()),
            timestamp: None,
            message: "hello".into(),
        });
        assert!(router.dispatch(&message));

        let other = IndiEvent::Message(MessageNotice {
            device: Some("E".into()),
            timestamp: None,
            message: "hello".into(),
        });
        assert!(!router.dispatch(&other));

        let global = IndiEvent::Message(MessageNotice {
            device: None,
            timestamp: None,
            message: "server".into(),
        });
        assert!(router.dispatch(&global));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["exact:D.-:true", "exact:-.-:true"]
        );
    }

    #[test]
    fn test_named_delete_routed_to_device_scope() {
        let log: Log = Arc::default();
        let mut router = Router::new();
        router.register("Dome Simulator.OTHER", recorder(&log, "other")).unwrap();

        let delete = |device: &str| {
            IndiEvent::Delete(DeleteNotice {
                device: device.into(),
                name: Some("SIMULATION".into()),
                timestamp: None,
                message: None,
            })
        };
        assert!(router.dispatch(&delete("Dome Simulator")));
        assert!(!router.dispatch(&delete("Telescope Simulator")));
        // A set for the same vector still needs a matching pattern
        assert!(!router.dispatch(&vector("Dome Simulator", "SIMULATION")));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["other:Dome Simulator.SIMULATION:false"]
        );
    }

    #[test]
    fn test_availability_table() {
        let log: Log = Arc::default();
        let mut router = Router::new();
        router.register("*.*", recorder(&log, "all")).unwrap();

        assert_eq!(router.availability("D", "N"), Availability::Unknown);
        router.set_available("D", "N", false);
        assert!(router.is_available("D", "N"));
        router.set_available("D", "M", true);
        assert_eq!(router.availability("D", "M"), Availability::Omitted);
        assert!(!router.is_available("D", "M"));

        router.dispatch(&vector("D", "N"));
        router.dispatch(&vector("D", "M"));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["all:D.N:true", "all:D.M:false"]
        );

        router.clear_availability();
        assert!(!router.is_available("D", "N"));
    }

    #[test]
    fn test_lookup() {
        let mut router = Router::new();
        router.register("D.*", Box::new(|_: &Delivery<'_>| {})).unwrap();
        assert_eq!(router.lookup("D", "N").map(|p| p.to_string()).as_deref(), Some("D.*"));
        assert!(router.lookup("E", "N").is_none());
        assert_eq!(router.patterns(), vec![PropertyPattern::parse("D.*").unwrap()]);
    }
}
