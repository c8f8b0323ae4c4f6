//! VM name parsing
//!
//! A managed VM is named after its fully qualified domain name: a host
//! label, a dot, then one or more domain labels. Labels hold ASCII
//! alphanumerics and hyphens and never start with a hyphen.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

fn fqdn_regex() -> &'static Regex {
    static FQDN: OnceLock<Regex> = OnceLock::new();
    FQDN.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9][A-Za-z0-9-]*)\.([A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*)$")
            .expect("FQDN pattern is a valid regex")
    })
}

/// A VM name split into host and domain labels
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fqdn {
    host: String,
    domain: String,
}

impl Fqdn {
    /// Parse a VM name, `None` when it does not have the FQDN shape
    pub fn parse(name: &str) -> Option<Self> {
        let captures = fqdn_regex().captures(name)?;
        Some(Self {
            host: captures[1].to_string(),
            domain: captures[2].to_string(),
        })
    }

    /// Check the FQDN shape without allocating
    pub fn is_valid(name: &str) -> bool {
        fqdn_regex().is_match(name)
    }

    /// First label
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Remaining labels joined by dots
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl fmt::Display for Fqdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.host, self.domain)
    }
}
