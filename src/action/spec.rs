//! # Action specification.
//!
//! An [`ActionSpec`] describes one external command invocation. Object
//! actions always carry `[path, verb, flags..]`; the executor prepends its
//! command prefix. Raw specs (pre-monitor-action commands) run as given.
//!
//! ```rust
//! use imon::{ActionSpec, ObjectPath};
//!
//! let spec = ActionSpec::object(&ObjectPath::svc("web"), "provision").leader().local();
//! assert_eq!(spec.args, ["svc/web", "provision", "--leader", "--local"]);
//! assert_eq!(spec.title, "provision");
//! ```

use std::time::Duration;

use crate::model::ObjectPath;

/// One external command invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionSpec {
    /// Short name used in logs and errors.
    pub title: String,
    pub args: Vec<String>,
    /// Kill the command after this long (`None` = no limit).
    pub timeout: Option<Duration>,
    /// Run `args` as-is, without the executor's command prefix.
    pub raw: bool,
}

impl ActionSpec {
    /// `<path> <verb>`, titled after the verb.
    pub fn object(path: &ObjectPath, verb: &str) -> Self {
        Self {
            title: verb.to_string(),
            args: vec![path.to_string(), verb.to_string()],
            timeout: None,
            raw: false,
        }
    }

    /// An arbitrary command line split on whitespace.
    ///
    /// Returns `None` for a blank command.
    pub fn raw(title: &str, command: &str) -> Option<Self> {
        let args: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if args.is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            args,
            timeout: None,
            raw: true,
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn local(self) -> Self {
        self.arg("--local")
    }

    pub fn leader(self) -> Self {
        self.arg("--leader")
    }

    /// `--rid a,b,c`
    pub fn rids(self, rids: &[String]) -> Self {
        self.arg("--rid").arg(rids.join(","))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_batch_args() {
        let spec = ActionSpec::object(&ObjectPath::svc("web"), "start")
            .rids(&["app#1".to_string(), "app#2".to_string()]);
        assert_eq!(spec.args, ["svc/web", "start", "--rid", "app#1,app#2"]);
    }

    #[test]
    fn raw_splits_on_whitespace() {
        let spec = ActionSpec::raw("pre monitor action", "  /bin/echo  hello ").unwrap();
        assert_eq!(spec.args, ["/bin/echo", "hello"]);
        assert!(spec.raw);
        assert!(ActionSpec::raw("x", "   ").is_none());
    }
}
