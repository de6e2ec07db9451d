//! Destination domain allow-list

use std::collections::BTreeSet;

use crate::common::error::RedeemError;

/// Domains that may receive redemption payments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainAllowList {
    /// Any domain
    All,
    /// Exact, case-insensitive matches only
    Only(BTreeSet<String>),
}

impl DomainAllowList {
    /// Parse a comma-separated list; empty or `*` means all
    pub fn parse(raw: &str) -> Self {
        Self::from_domains(raw.split(','))
    }

    pub fn from_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for domain in domains {
            let domain = domain.as_ref().trim().to_lowercase();
            if domain == "*" {
                return Self::All;
            }
            if !domain.is_empty() {
                set.insert(domain);
            }
        }

        if set.is_empty() {
            Self::All
        } else {
            Self::Only(set)
        }
    }

    pub fn allows(&self, domain: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(set) => set.contains(&domain.trim().to_lowercase()),
        }
    }

    pub fn check(&self, domain: &str) -> Result<(), RedeemError> {
        if self.allows(domain) {
            Ok(())
        } else {
            Err(RedeemError::DomainNotAllowed(format!(
                "{} is not an allowed destination domain",
                domain
            )))
        }
    }
}

impl Default for DomainAllowList {
    fn default() -> Self {
        Self::All
    }
}

impl std::fmt::Display for DomainAllowList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "*"),
            Self::Only(set) => {
                let list: Vec<&str> = set.iter().map(String::as_str).collect();
                write!(f, "{}", list.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_and_empty() {
        assert_eq!(DomainAllowList::parse(""), DomainAllowList::All);
        assert_eq!(DomainAllowList::parse("*"), DomainAllowList::All);
        assert_eq!(DomainAllowList::parse("ln.tips,*"), DomainAllowList::All);
        assert!(DomainAllowList::All.allows("anything.example"));
    }

    #[test]
    fn test_exact_case_insensitive() {
        let list = DomainAllowList::parse("ln.tips, GetAlby.com");
        assert!(list.allows("ln.tips"));
        assert!(list.allows("getalby.com"));
        assert!(list.allows("LN.TIPS"));
        assert!(!list.allows("evil.com"));
        assert!(!list.allows("sub.ln.tips"));
        assert!(matches!(
            list.check("evil.com"),
            Err(RedeemError::DomainNotAllowed(_))
        ));
    }

    #[test]
    fn test_display() {
        let list = DomainAllowList::parse("ln.tips,getalby.com");
        assert_eq!(list.to_string(), "getalby.com,ln.tips");
    }
}
