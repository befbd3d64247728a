//! # Object path
//!
//! An object is addressed as `<namespace>/<kind>/<name>`. The `root` namespace
//! is elided in the short form (`svc/web` rather than `root/svc/web`).
//!
//! Scaled objects carry a slice index prefix in their name (`3.web`); the
//! [`ObjectPath::scaler_slice_index`] accessor exposes it for the `shift`
//! placement policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// Kind of a cluster object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Svc,
    Vol,
    Cfg,
    Sec,
    Usr,
    Ccfg,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Svc => "svc",
            Kind::Vol => "vol",
            Kind::Cfg => "cfg",
            Kind::Sec => "sec",
            Kind::Usr => "usr",
            Kind::Ccfg => "ccfg",
        }
    }

    /// Only services and volumes have resources worth restarting.
    pub fn has_restartable_resources(&self) -> bool {
        matches!(self, Kind::Svc | Kind::Vol)
    }
}

impl FromStr for Kind {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "svc" => Ok(Kind::Svc),
            "vol" => Ok(Kind::Vol),
            "cfg" => Ok(Kind::Cfg),
            "sec" => Ok(Kind::Sec),
            "usr" => Ok(Kind::Usr),
            "ccfg" => Ok(Kind::Ccfg),
            other => Err(RequestError::Unknown {
                what: "kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Fully qualified object path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectPath {
    pub namespace: String,
    pub kind: Kind,
    pub name: String,
}

impl ObjectPath {
    pub fn new(namespace: impl Into<String>, kind: Kind, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            kind,
            name: name.into(),
        }
    }

    /// Shorthand for a service in the root namespace.
    pub fn svc(name: impl Into<String>) -> Self {
        Self::new("root", Kind::Svc, name)
    }

    /// The cluster configuration object is never orchestrated like a service.
    pub fn is_cluster(&self) -> bool {
        self.kind == Kind::Ccfg && self.name == "cluster"
    }

    /// Returns the slice index of a scaled object (`"3.web"` → `Some(3)`).
    pub fn scaler_slice_index(&self) -> Option<usize> {
        let (head, rest) = self.name.split_once('.')?;
        if rest.is_empty() {
            return None;
        }
        head.parse().ok()
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace == "root" {
            write!(f, "{}/{}", self.kind.as_str(), self.name)
        } else {
            write!(f, "{}/{}/{}", self.namespace, self.kind.as_str(), self.name)
        }
    }
}

impl FromStr for ObjectPath {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let invalid = || RequestError::Unknown {
            what: "path",
            value: s.to_string(),
        };
        match parts.as_slice() {
            [name] if !name.is_empty() => Ok(Self::svc(*name)),
            [kind, name] if !name.is_empty() => Ok(Self::new("root", kind.parse()?, *name)),
            [ns, kind, name] if !ns.is_empty() && !name.is_empty() => {
                Ok(Self::new(*ns, kind.parse()?, *name))
            }
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for ObjectPath {
    type Error = RequestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObjectPath> for String {
    fn from(p: ObjectPath) -> Self {
        p.to_string()
    }
}
