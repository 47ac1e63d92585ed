// Usage flags: which optional helper methods the generated classes need.
// An explicit accumulator owned by the translation run and threaded
// through the pass, so runs stay composable and testable in isolation.

use std::collections::BTreeSet;

/// Optional helper methods that may be emitted into the generated agent
/// and model classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Helper {
    // agent-level
    Copy,
    HasAttr,
    HasRel,
    MatchesQry,
    // model-level
    GetAttr,
    GetGroups,
    GetMass,
    GetMassProp,
    GetMassAndProp,
    GetGroupsMass,
    GetGroupsMassProp,
    GetGroupsMassAndProp,
}

impl Helper {
    /// Helpers this one calls into; recording a helper records its
    /// dependencies as well.
    fn implies(self) -> &'static [Helper] {
        match self {
            Helper::GetMass => &[Helper::GetGroups],
            Helper::GetMassProp => &[Helper::GetMass],
            Helper::GetMassAndProp => &[Helper::GetMassProp],
            Helper::GetGroupsMass => &[Helper::GetGroups],
            Helper::GetGroupsMassProp => &[Helper::GetGroupsMass],
            Helper::GetGroupsMassAndProp => &[Helper::GetGroupsMassProp],
            _ => &[],
        }
    }
}

/// Run-scoped accumulator of referenced helpers. Flags are only ever
/// added; the set is consumed once, at code assembly.
#[derive(Debug, Clone, Default)]
pub struct UsageFlags {
    used: BTreeSet<Helper>,
}

impl UsageFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, helper: Helper) {
        if self.used.insert(helper) {
            for dep in helper.implies() {
                self.record(*dep);
            }
        }
    }

    pub fn contains(&self, helper: Helper) -> bool {
        self.used.contains(&helper)
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Helper> + '_ {
        self.used.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implication_closure() {
        let mut flags = UsageFlags::new();
        flags.record(Helper::GetMassAndProp);
        assert!(flags.contains(Helper::GetMassAndProp));
        assert!(flags.contains(Helper::GetMassProp));
        assert!(flags.contains(Helper::GetMass));
        assert!(flags.contains(Helper::GetGroups));
        assert!(!flags.contains(Helper::GetAttr));
    }

    #[test]
    fn test_fresh_run_is_empty() {
        assert!(UsageFlags::new().is_empty());
    }
}
