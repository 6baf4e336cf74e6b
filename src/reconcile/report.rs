//! Outcomes of reconciliation passes

use std::fmt;

use crate::types::RoleId;

/// What a reconciliation did to one member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberOutcome {
    /// Listening; the listener role was granted
    Granted(RoleId),

    /// Listening; the listener role was already held
    Retained(RoleId),

    /// Not listening; these listener roles were revoked
    Revoked(Vec<RoleId>),

    /// Not listening and no listener role held
    Unchanged,

    /// Listening, but none of the member's roles is mapped
    Skipped,
}

impl MemberOutcome {
    /// Whether a role mutation was issued
    pub fn mutated(&self) -> bool {
        match self {
            MemberOutcome::Granted(_) => true,
            MemberOutcome::Revoked(roles) => !roles.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for MemberOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberOutcome::Granted(role) => write!(f, "granted listener role {}", role),
            MemberOutcome::Retained(role) => write!(f, "already holds listener role {}", role),
            MemberOutcome::Revoked(roles) => {
                let ids: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
                write!(f, "revoked listener roles {}", ids.join(", "))
            }
            MemberOutcome::Unchanged => write!(f, "not listening"),
            MemberOutcome::Skipped => write!(f, "listening, but holds no mapped role"),
        }
    }
}

/// Aggregated counts of a community or full pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub communities: usize,
    pub members: usize,
    pub granted: usize,
    pub revoked: usize,

    /// Members whose mutation failed; they are re-evaluated next pass
    pub failed: usize,
}

impl PassReport {
    pub fn record(&mut self, outcome: &MemberOutcome) {
        self.members += 1;
        match outcome {
            MemberOutcome::Granted(_) => self.granted += 1,
            MemberOutcome::Revoked(roles) => self.revoked += roles.len(),
            _ => {}
        }
    }

    pub fn record_failure(&mut self) {
        self.members += 1;
        self.failed += 1;
    }

    pub fn merge(&mut self, other: PassReport) {
        self.communities += other.communities;
        self.members += other.members;
        self.granted += other.granted;
        self.revoked += other.revoked;
        self.failed += other.failed;
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} communities, {} members: {} granted, {} revoked, {} failed",
            self.communities, self.members, self.granted, self.revoked, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_merge() {
        let mut a = PassReport::default();
        a.record(&MemberOutcome::Granted(RoleId(1)));
        a.record(&MemberOutcome::Revoked(vec![RoleId(1), RoleId(2)]));
        a.record(&MemberOutcome::Unchanged);
        a.record_failure();

        let mut b = PassReport {
            communities: 1,
            ..Default::default()
        };
        b.merge(a);

        assert_eq!(
            b,
            PassReport {
                communities: 1,
                members: 4,
                granted: 1,
                revoked: 2,
                failed: 1
            }
        );
    }

    #[test]
    fn test_mutated() {
        assert!(MemberOutcome::Granted(RoleId(1)).mutated());
        assert!(!MemberOutcome::Retained(RoleId(1)).mutated());
        assert!(!MemberOutcome::Revoked(vec![]).mutated());
        assert!(!MemberOutcome::Skipped.mutated());
    }
}
