//! Device discovery.
//!
//! One [`Scanner::scan`] pass runs the whole discovery pipeline:
//!
//! - Walk the persistent alias directories (`/dev/input/by-id`, then `/dev/input/by-path`)
//!   and resolve each alias to its event node. The first alias seen for a node wins;
//!   later aliases of the same node are duplicates.
//! - Walk the raw device directory for `event*` nodes no alias pointed at.
//! - For each candidate: open → classify → exclusion check → switch to non-blocking.
//!
//! Every handle the pass opens is either returned in [`ScanOutcome::devices`] or dropped
//! (closed) before `scan` returns.
//!
//! ## Reports
//! [`ScanOutcome::report`] records, per candidate, where it was accepted or dropped. The
//! monitor feeds every report to a [`DropLog`], which logs a node's drop once and stays
//! quiet on later scans until that node's outcome changes. Tooling can use the same report
//! to explain why a keyboard was never offered.

use crate::backends::{is_event_node, Backend};
use crate::classifier::classify;
use crate::config::{IdentityPolicy, MonitorConfig};
use crate::device::{DeviceIdentity, HandleId, MonitoredDevice};
use crate::ledger::Exclusions;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;

/// A node to try, with the alias it was reached through (if any).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub node: PathBuf,
    pub alias: Option<PathBuf>,
}

/// Where along the pipeline a candidate was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropStage {
    /// The node could not be opened (message of the OS error).
    OpenFailed(String),
    /// Opened, but not keyboard-like.
    NotKeyboard,
    /// Its identity or its event node already holds a slot.
    AlreadyAssigned,
    /// Non-blocking mode could not be enabled (message of the OS error).
    NonBlockingFailed(String),
}

impl fmt::Display for DropStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropStage::OpenFailed(e) => write!(f, "open failed: {e}"),
            DropStage::NotKeyboard => f.write_str("not a keyboard"),
            DropStage::AlreadyAssigned => f.write_str("already assigned"),
            DropStage::NonBlockingFailed(e) => write!(f, "cannot switch to non-blocking: {e}"),
        }
    }
}

/// What happened to one candidate.
#[derive(Debug, Clone)]
pub struct CandidateReport {
    pub candidate: Candidate,
    pub identity: DeviceIdentity,
    /// Device name, when it got as far as being opened.
    pub name: Option<String>,
    /// `None` means the device was accepted.
    pub drop_stage: Option<DropStage>,
}

/// Result of one discovery pass.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Open, non-blocking, unassigned keyboards.
    pub devices: Vec<MonitoredDevice>,
    /// One record per candidate, in discovery order.
    pub report: Vec<CandidateReport>,
}

impl ScanOutcome {
    pub fn dropped(&self) -> impl Iterator<Item = &CandidateReport> {
        self.report.iter().filter(|r| r.drop_stage.is_some())
    }
}

/// Discovery pipeline bound to a set of directories and an identity policy.
#[derive(Clone, Debug)]
pub struct Scanner {
    alias_dirs: Vec<PathBuf>,
    device_dir: PathBuf,
    policy: IdentityPolicy,
}

impl Scanner {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            alias_dirs: config.alias_dirs.clone(),
            device_dir: config.device_dir.clone(),
            policy: config.identity,
        }
    }

    /// Enumerate candidates: aliases first, then raw nodes, one entry per node.
    pub fn candidates(&self, backend: &dyn Backend) -> Vec<Candidate> {
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut out = Vec::new();

        for dir in &self.alias_dirs {
            let aliases = match backend.aliases(dir) {
                Ok(aliases) => aliases,
                Err(e) => {
                    warn!("cannot list alias directory {}: {e}", dir.display());
                    continue;
                }
            };
            for alias in aliases {
                if !is_event_node(&alias.target) || !seen.insert(alias.target.clone()) {
                    continue;
                }
                out.push(Candidate {
                    node: alias.target,
                    alias: Some(alias.alias),
                });
            }
        }

        match backend.nodes(&self.device_dir) {
            Ok(nodes) => {
                for node in nodes {
                    if is_event_node(&node) && seen.insert(node.clone()) {
                        out.push(Candidate { node, alias: None });
                    }
                }
            }
            Err(e) => warn!(
                "cannot list device directory {}: {e}",
                self.device_dir.display()
            ),
        }

        out
    }

    /// Run one discovery pass, skipping whatever `excluded` names.
    pub fn scan<B: Backend>(&self, backend: &mut B, excluded: &Exclusions) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        for candidate in self.candidates(&*backend) {
            let identity = self
                .policy
                .identity(&candidate.node, candidate.alias.as_deref());
            let mut report = CandidateReport {
                candidate,
                identity,
                name: None,
                drop_stage: None,
            };

            let mut device = match backend.open(&report.candidate.node) {
                Ok(device) => device,
                Err(e) => {
                    debug!("skipping candidate: {e}");
                    report.drop_stage = Some(DropStage::OpenFailed(e.io().to_string()));
                    outcome.report.push(report);
                    continue;
                }
            };
            report.name = Some(device.name().to_string());

            if !classify(&device.capabilities()) {
                report.drop_stage = Some(DropStage::NotKeyboard);
            } else if excluded.excludes(&report.identity, &report.candidate.node) {
                report.drop_stage = Some(DropStage::AlreadyAssigned);
            } else if let Err(e) = device.set_nonblocking() {
                debug!("skipping candidate: {e}");
                report.drop_stage = Some(DropStage::NonBlockingFailed(e.io().to_string()));
            }

            match report.drop_stage {
                // Rejected: the handle closes here.
                Some(_) => drop(device),
                None => {
                    let monitored = MonitoredDevice {
                        handle: HandleId::next(),
                        identity: report.identity.clone(),
                        device,
                    };
                    debug!(
                        "candidate keyboard {} ({}) as {}",
                        monitored.name(),
                        monitored.identity,
                        monitored.handle
                    );
                    outcome.devices.push(monitored);
                }
            }
            outcome.report.push(report);
        }

        debug!(
            "scan: {} candidate(s), {} unassigned keyboard(s)",
            outcome.report.len(),
            outcome.devices.len()
        );
        outcome
    }
}

/// Remembers why each node was dropped on the previous scan.
///
/// Failed opens are `warn!`ed, other drops `debug!`ged, each only when the node's drop
/// stage differs from last time. A node that is unreadable for the whole session is
/// reported once, not on every rescan.
#[derive(Debug, Default)]
pub struct DropLog {
    last: HashMap<PathBuf, DropStage>,
}

impl DropLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log drops that are new since the previous call. Returns how many were logged.
    pub fn record(&mut self, outcome: &ScanOutcome) -> usize {
        let mut current = HashMap::new();
        let mut logged = 0;
        for report in outcome.dropped() {
            let Some(stage) = &report.drop_stage else {
                continue;
            };
            let node = &report.candidate.node;
            if self.last.get(node) != Some(stage) {
                logged += 1;
                match stage {
                    DropStage::OpenFailed(_) | DropStage::NonBlockingFailed(_) => {
                        warn!("skipping {} ({}): {stage}", node.display(), report.identity)
                    }
                    DropStage::NotKeyboard | DropStage::AlreadyAssigned => debug!(
                        "skipping {} {}: {stage}",
                        node.display(),
                        report.name.as_deref().unwrap_or("")
                    ),
                }
            }
            current.insert(node.clone(), stage.clone());
        }
        self.last = current;
        logged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_input::VirtualController;

    fn scanner(policy: IdentityPolicy) -> Scanner {
        Scanner::new(&MonitorConfig {
            identity: policy,
            ..MonitorConfig::default()
        })
    }

    fn names(outcome: &ScanOutcome) -> Vec<String> {
        outcome
            .devices
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }

    #[test]
    fn keeps_keyboards_and_closes_everything_else() {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event1", "Keyboard A");
        ctl.add_mouse("/dev/input/event2", "Mouse");
        ctl.add_keyboard("/dev/input/event3", "Keyboard B");

        let mut backend = ctl.backend();
        let outcome = scanner(IdentityPolicy::StableAlias).scan(&mut backend, &Exclusions::default());

        assert_eq!(names(&outcome), vec!["Keyboard A", "Keyboard B"]);
        assert_eq!(ctl.opens(), 3);
        // The mouse handle was closed before returning.
        assert_eq!(ctl.live_handles(), 2);
        assert!(outcome
            .dropped()
            .any(|r| r.drop_stage == Some(DropStage::NotKeyboard)));
    }

    #[test]
    fn accepted_candidates_carry_no_drop_stage() {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event1", "Keyboard A");
        let mut backend = ctl.backend();
        let outcome = scanner(IdentityPolicy::StableAlias).scan(&mut backend, &Exclusions::default());
        assert_eq!(outcome.devices.len(), 1);
        assert!(outcome.report[0].drop_stage.is_none());
    }

    #[test]
    fn aliases_of_one_node_yield_one_candidate() {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event4", "Acme Keyboard");
        ctl.add_alias("/dev/input/event4", "/dev/input/by-id/usb-Acme-event-kbd");
        ctl.add_alias("/dev/input/event4", "/dev/input/by-path/pci-0000:00:14.0-usb-0:2:1.0-event-kbd");

        let backend = ctl.backend();
        let candidates = scanner(IdentityPolicy::StableAlias).candidates(&backend);
        assert_eq!(
            candidates,
            vec![Candidate {
                node: PathBuf::from("/dev/input/event4"),
                alias: Some(PathBuf::from("/dev/input/by-id/usb-Acme-event-kbd")),
            }]
        );
    }

    #[test]
    fn raw_nodes_fill_in_what_aliases_miss() {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event1", "USB Keyboard");
        ctl.add_alias("/dev/input/event1", "/dev/input/by-id/usb-kbd-event-kbd");
        ctl.add_keyboard("/dev/input/event2", "AT Translated Set 2 keyboard");

        let backend = ctl.backend();
        let candidates = scanner(IdentityPolicy::StableAlias).candidates(&backend);
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].alias.is_some());
        assert_eq!(candidates[1].node, PathBuf::from("/dev/input/event2"));
        assert_eq!(candidates[1].alias, None);
    }

    #[test]
    fn identity_follows_the_policy() {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event1", "USB Keyboard");
        ctl.add_alias("/dev/input/event1", "/dev/input/by-id/usb-kbd-event-kbd");

        let mut backend = ctl.backend();
        let stable = scanner(IdentityPolicy::StableAlias).scan(&mut backend, &Exclusions::default());
        assert_eq!(
            stable.devices[0].identity.as_str(),
            "/dev/input/by-id/usb-kbd-event-kbd"
        );

        let node = scanner(IdentityPolicy::DeviceNode).scan(&mut backend, &Exclusions::default());
        assert_eq!(node.devices[0].identity.as_str(), "/dev/input/event1");
    }

    #[test]
    fn assigned_identities_are_opened_then_closed() {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event1", "Keyboard A");
        ctl.add_keyboard("/dev/input/event2", "Keyboard B");

        let assigned = Exclusions {
            identities: [DeviceIdentity::new("/dev/input/event1")].into_iter().collect(),
            ..Exclusions::default()
        };
        let mut backend = ctl.backend();
        let outcome = scanner(IdentityPolicy::StableAlias).scan(&mut backend, &assigned);

        assert_eq!(names(&outcome), vec!["Keyboard B"]);
        assert_eq!(ctl.live_handles(), 1);
        assert_eq!(
            outcome.report[0].drop_stage,
            Some(DropStage::AlreadyAssigned)
        );
    }

    #[test]
    fn one_failing_open_does_not_hide_the_others() {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event1", "Keyboard A");
        ctl.add_keyboard("/dev/input/event2", "Keyboard B");
        ctl.add_keyboard("/dev/input/event3", "Keyboard C");
        ctl.fail_opens("/dev/input/event2", 1);

        let mut backend = ctl.backend();
        let outcome = scanner(IdentityPolicy::StableAlias).scan(&mut backend, &Exclusions::default());

        assert_eq!(names(&outcome), vec!["Keyboard A", "Keyboard C"]);
        let failed: Vec<_> = outcome.dropped().collect();
        assert_eq!(failed.len(), 1);
        assert!(matches!(failed[0].drop_stage, Some(DropStage::OpenFailed(_))));
        assert_eq!(failed[0].name, None);
    }

    #[test]
    fn aliases_to_non_event_nodes_are_ignored() {
        let ctl = VirtualController::new();
        ctl.add_mouse("/dev/input/mouse0", "Legacy mouse");
        ctl.add_alias("/dev/input/mouse0", "/dev/input/by-id/usb-mouse-mouse");

        let backend = ctl.backend();
        assert!(scanner(IdentityPolicy::StableAlias)
            .candidates(&backend)
            .is_empty());
    }

    #[test]
    fn assigned_nodes_are_excluded_whatever_their_identity() {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event1", "Keyboard A");
        // The by-id link appeared after the node was assigned under its node identity.
        ctl.add_alias("/dev/input/event1", "/dev/input/by-id/usb-Acme-event-kbd");

        let assigned = Exclusions {
            identities: [DeviceIdentity::new("/dev/input/event1")].into_iter().collect(),
            nodes: [PathBuf::from("/dev/input/event1")].into_iter().collect(),
        };
        let mut backend = ctl.backend();
        let outcome = scanner(IdentityPolicy::StableAlias).scan(&mut backend, &assigned);

        assert!(outcome.devices.is_empty());
        assert_eq!(
            outcome.report[0].identity.as_str(),
            "/dev/input/by-id/usb-Acme-event-kbd"
        );
        assert_eq!(outcome.report[0].drop_stage, Some(DropStage::AlreadyAssigned));
        assert_eq!(ctl.live_handles(), 0);
    }

    #[test]
    fn drop_log_reports_a_persistent_failure_once() {
        let ctl = VirtualController::new();
        ctl.add_keyboard("/dev/input/event1", "Keyboard A");
        ctl.add_keyboard("/dev/input/event2", "Keyboard B");
        ctl.fail_opens("/dev/input/event2", 3);

        let scanner = scanner(IdentityPolicy::StableAlias);
        let mut backend = ctl.backend();
        let mut log = DropLog::new();
        let mut scan = || scanner.scan(&mut backend, &Exclusions::default());

        assert_eq!(log.record(&scan()), 1);
        assert_eq!(log.record(&scan()), 0);
        assert_eq!(log.record(&scan()), 0);
        // Opens succeed again: nothing dropped, nothing logged.
        assert_eq!(log.record(&scan()), 0);

        ctl.fail_opens("/dev/input/event2", 1);
        assert_eq!(log.record(&scan()), 1);
    }
}
