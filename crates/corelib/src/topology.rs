//! Failure-domain descriptors for topology-aware placement.
//!
//! Every field is optional. A missing field means "unknown" and never
//! distinguishes two nodes.

use std::fmt;
use std::sync::Arc;

/// Site / rack / machine descriptor attached to an [`Address`](crate::Address).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TopologyInfo {
    pub site: Option<Arc<str>>,
    pub rack: Option<Arc<str>>,
    pub machine: Option<Arc<str>>,
}

/// Coarsest failure-domain level at which two nodes are known to differ.
///
/// Ordered so that a larger value means better separation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TopologyLevel {
    /// Identical domains, or either side unknown.
    Same,
    /// No known field differs, but one side knows a field the other does
    /// not. The nodes may share a domain; they are not known to.
    Partial,
    Machine,
    Rack,
    Site,
}

impl TopologyInfo {
    pub fn new(site: Option<&str>, rack: Option<&str>, machine: Option<&str>) -> Self {
        Self {
            site: site.map(Arc::from),
            rack: rack.map(Arc::from),
            machine: machine.map(Arc::from),
        }
    }

    /// Parse `site/rack/machine`; empty or `-` components are unknown.
    ///
    /// ```
    /// use corelib::TopologyInfo;
    ///
    /// let t = TopologyInfo::parse("s1/r0/-");
    /// assert_eq!(t.site.as_deref(), Some("s1"));
    /// assert_eq!(t.machine, None);
    /// ```
    pub fn parse(spec: &str) -> Self {
        let mut parts = spec.splitn(3, '/').map(|part| {
            let part = part.trim();
            (!part.is_empty() && part != "-").then(|| Arc::from(part))
        });
        Self {
            site: parts.next().flatten(),
            rack: parts.next().flatten(),
            machine: parts.next().flatten(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.site.is_none() && self.rack.is_none() && self.machine.is_none()
    }

    /// The `(site, rack, machine)` tuple, or `None` when nothing is known.
    pub fn domain_key(&self) -> Option<(Option<&str>, Option<&str>, Option<&str>)> {
        if self.is_unknown() {
            return None;
        }
        Some((
            self.site.as_deref(),
            self.rack.as_deref(),
            self.machine.as_deref(),
        ))
    }

    /// Coarsest level at which `a` and `b` are known to differ.
    ///
    /// [`TopologyLevel::Partial`] when nothing known differs but the
    /// descriptors are not identical. A missing or fully unknown descriptor
    /// is always [`TopologyLevel::Same`].
    pub fn distance(a: Option<&TopologyInfo>, b: Option<&TopologyInfo>) -> TopologyLevel {
        fn known(t: Option<&TopologyInfo>) -> Option<&TopologyInfo> {
            t.filter(|t| !t.is_unknown())
        }
        let (Some(a), Some(b)) = (known(a), known(b)) else {
            return TopologyLevel::Same;
        };
        if differs(&a.site, &b.site) {
            TopologyLevel::Site
        } else if differs(&a.rack, &b.rack) {
            TopologyLevel::Rack
        } else if differs(&a.machine, &b.machine) {
            TopologyLevel::Machine
        } else if a.domain_key() != b.domain_key() {
            TopologyLevel::Partial
        } else {
            TopologyLevel::Same
        }
    }
}

fn differs(a: &Option<Arc<str>>, b: &Option<Arc<str>>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a != b)
}

impl fmt::Display for TopologyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |p: &Option<Arc<str>>| p.as_deref().unwrap_or("-").to_string();
        write!(
            f,
            "{}/{}/{}",
            part(&self.site),
            part(&self.rack),
            part(&self.machine)
        )
    }
}
