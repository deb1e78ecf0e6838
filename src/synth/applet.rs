//! EEM applet construction.
//!
//! IOS sorts applet actions by label as strings, not numbers. Labels are
//! therefore `major.minor` with a single-digit minor and a two-digit major:
//! after `10.9` comes `11.0`, never `10.10`, so string order always matches
//! the order actions were added.

use std::time::Duration;

use crate::error::SynthesisError;

/// First major label number.
pub const FIRST_MAJOR: u32 = 10;
/// Last major label number that keeps two digits.
pub const LAST_MAJOR: u32 = 99;
/// Most actions one applet can carry.
pub const MAX_ACTIONS: usize = ((LAST_MAJOR - FIRST_MAJOR + 1) * 10) as usize;

/// Hands out action labels in order.
#[derive(Debug, Clone)]
pub struct ActionLabeler {
    major: u32,
    minor: u32,
}

impl Default for ActionLabeler {
    fn default() -> Self {
        ActionLabeler {
            major: FIRST_MAJOR,
            minor: 0,
        }
    }
}

impl ActionLabeler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next label, or `None` once the two-digit majors are used up.
    pub fn next_label(&mut self) -> Option<String> {
        if self.major > LAST_MAJOR {
            return None;
        }
        let label = format!("{}.{}", self.major, self.minor);
        self.minor += 1;
        if self.minor > 9 {
            self.minor = 0;
            self.major += 1;
        }
        Some(label)
    }

    /// Start a new major group unless one was just opened.
    pub fn open_group(&mut self) {
        if self.minor != 0 {
            self.minor = 0;
            self.major += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub label: String,
    pub body: String,
}

/// A finished applet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applet {
    pub name: String,
    pub event: String,
    pub actions: Vec<Action>,
}

/// Collects actions and labels them; overflow is reported by [`build`].
///
/// [`build`]: AppletBuilder::build
#[derive(Debug)]
pub struct AppletBuilder {
    node: String,
    name: String,
    event: String,
    labeler: ActionLabeler,
    actions: Vec<Action>,
    overflow: bool,
}

impl AppletBuilder {
    pub fn new(node: &str, name: &str) -> Self {
        AppletBuilder {
            node: node.to_string(),
            name: name.to_string(),
            event: String::new(),
            labeler: ActionLabeler::new(),
            actions: Vec::new(),
            overflow: false,
        }
    }

    /// One-shot countdown timer trigger.
    pub fn countdown(mut self, delay: Duration) -> Self {
        self.event = format!("timer countdown time {}", delay.as_secs());
        self
    }

    pub fn group(mut self) -> Self {
        self.labeler.open_group();
        self
    }

    fn action(mut self, body: String) -> Self {
        match self.labeler.next_label() {
            Some(label) => self.actions.push(Action { label, body }),
            None => self.overflow = true,
        }
        self
    }

    pub fn cli(self, command: &str) -> Self {
        self.action(format!("cli command \"{command}\""))
    }

    /// CLI command answered by the next action once `pattern` is seen.
    pub fn cli_expect(self, command: &str, pattern: &str) -> Self {
        self.action(format!("cli command \"{command}\" pattern \"{pattern}\""))
    }

    pub fn regexp(self, pattern: &str, input: &str) -> Self {
        self.action(format!("regexp \"{pattern}\" \"{input}\""))
    }

    pub fn if_matched(self) -> Self {
        self.action("if $_regexp_result eq \"1\"".to_string())
    }

    pub fn otherwise(self) -> Self {
        self.action("else".to_string())
    }

    pub fn end(self) -> Self {
        self.action("end".to_string())
    }

    pub fn syslog(self, message: &str) -> Self {
        self.action(format!("syslog msg \"{message}\""))
    }

    pub fn syslog_warning(self, message: &str) -> Self {
        self.action(format!("syslog priority warnings msg \"{message}\""))
    }

    pub fn build(self) -> Result<Applet, SynthesisError> {
        if self.overflow {
            return Err(SynthesisError::AppletOverflow {
                node: self.node,
                applet: self.name,
                limit: MAX_ACTIONS,
            });
        }
        Ok(Applet {
            name: self.name,
            event: self.event,
            actions: self.actions,
        })
    }
}

/// IOS prints a leading `*` on `show clock` when the time is not
/// authoritative.
const CLOCK_NOT_AUTHORITATIVE: &str = "^\\*";

/// CA applet: fix the clock if needed, then enable the PKI server.
pub fn authority_applet(
    node: &str,
    server: &str,
    delay: Duration,
    clock_anchor: &str,
    passphrase: &str,
) -> Result<Applet, SynthesisError> {
    AppletBuilder::new(node, "PKI-SERVER-START")
        .countdown(delay)
        .cli("enable")
        .cli("show clock")
        .regexp(CLOCK_NOT_AUTHORITATIVE, "$_cli_result")
        .if_matched()
        .cli(&format!("clock set {clock_anchor}"))
        .end()
        .group()
        .cli("configure terminal")
        .cli(&format!("crypto pki server {server}"))
        .cli_expect("no shutdown", "Password:")
        .cli_expect(passphrase, "Re-enter password:")
        .cli(passphrase)
        .cli("end")
        .syslog(&format!("PKI server {server} enabled"))
        .build()
}

/// Client applet: set the clock only if unsynchronised, authenticate and
/// enroll, and log instead of failing when the CA is not ready.
pub fn enrollment_applet(
    node: &str,
    trustpoint: &str,
    delay: Duration,
    clock_anchor: &str,
    passphrase: &str,
) -> Result<Applet, SynthesisError> {
    AppletBuilder::new(node, "PKI-ENROLL")
        .countdown(delay)
        .cli("enable")
        .cli("show clock")
        .regexp(CLOCK_NOT_AUTHORITATIVE, "$_cli_result")
        .if_matched()
        .cli(&format!("clock set {clock_anchor}"))
        .end()
        .group()
        .cli("configure terminal")
        .cli_expect(&format!("crypto pki authenticate {trustpoint}"), "yes/no")
        .cli("yes")
        .cli_expect(&format!("crypto pki enroll {trustpoint}"), "Password:")
        .cli_expect(passphrase, "Re-enter password:")
        .cli_expect(passphrase, "serial number")
        .cli_expect("no", "IP address")
        .cli_expect("no", "Request certificate")
        .cli("yes")
        .cli("end")
        .group()
        .cli(&format!("show crypto pki certificates {trustpoint}"))
        .regexp("Status: Available", "$_cli_result")
        .if_matched()
        .syslog(&format!("{trustpoint} enrolled"))
        .otherwise()
        .syslog_warning(&format!(
            "{trustpoint} enrollment failed; routing and interfaces left unchanged"
        ))
        .end()
        .build()
}
