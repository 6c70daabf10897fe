//! Eligibility decisions over a rule set.

use crate::rules::RuleSet;
use std::sync::Arc;

/// Answers whether responses for an operation may be cached.
pub trait ActionMatcher: Send + Sync {
    /// `operation` is expected to be stripped of quote characters already.
    fn is_eligible(&self, operation: &str) -> bool;
}

/// Why a decision was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchReason {
    /// Listed as disabled
    ExactDeny,
    /// Listed as enabled
    ExactAllow,
    /// Matched a disabling pattern
    DenyPattern(String),
    /// Matched an enabling pattern
    AllowPattern(String),
    /// No rule applies
    NoMatch,
}

/// An eligibility decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub eligible: bool,
    pub reason: MatchReason,
}

impl Decision {
    fn allow(reason: MatchReason) -> Self {
        Self {
            eligible: true,
            reason,
        }
    }

    fn deny(reason: MatchReason) -> Self {
        Self {
            eligible: false,
            reason,
        }
    }
}

/// Evaluate `operation` against `rules`. The first matching step wins:
/// exact deny, exact allow, deny pattern, allow pattern, then ineligible.
pub fn evaluate(rules: &RuleSet, operation: &str) -> Decision {
    if rules.deny.contains(operation) {
        return Decision::deny(MatchReason::ExactDeny);
    }

    if rules.allow.contains(operation) {
        return Decision::allow(MatchReason::ExactAllow);
    }

    if let Some(p) = rules.deny_patterns.iter().find(|p| p.matches(operation)) {
        return Decision::deny(MatchReason::DenyPattern(p.as_str().to_string()));
    }

    if let Some(p) = rules.allow_patterns.iter().find(|p| p.matches(operation)) {
        return Decision::allow(MatchReason::AllowPattern(p.as_str().to_string()));
    }

    Decision::deny(MatchReason::NoMatch)
}

impl ActionMatcher for RuleSet {
    fn is_eligible(&self, operation: &str) -> bool {
        evaluate(self, operation).eligible
    }
}

impl<T: ActionMatcher + ?Sized> ActionMatcher for Arc<T> {
    fn is_eligible(&self, operation: &str) -> bool {
        (**self).is_eligible(operation)
    }
}
