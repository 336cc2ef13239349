//! Tag predicates applied to candidate tagsets before fetching.

use serde::{Deserialize, Serialize};

use crate::tagset::TagSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Predicate {
    /// Conjunction. `All(vec![])` accepts everything.
    All(Vec<Predicate>),
    /// Disjunction. `Any(vec![])` rejects everything.
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
    Equals { key: String, value: String },
    In { key: String, values: Vec<String> },
}

impl Predicate {
    pub fn always() -> Self {
        Predicate::All(Vec::new())
    }

    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Predicate::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Predicate::All(v) if v.is_empty())
    }

    /// `self AND other`, flattening trivial operands.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self.is_always(), other.is_always()) {
            (true, _) => other,
            (_, true) => self,
            _ => Predicate::All(vec![self, other]),
        }
    }

    pub fn apply(&self, tagset: &TagSet) -> bool {
        match self {
            Predicate::All(ps) => ps.iter().all(|p| p.apply(tagset)),
            Predicate::Any(ps) => ps.iter().any(|p| p.apply(tagset)),
            Predicate::Not(p) => !p.apply(tagset),
            Predicate::Equals { key, value } => tagset.get(key) == Some(value.as_str()),
            Predicate::In { key, values } => tagset
                .get(key)
                .map_or(false, |v| values.iter().any(|w| w == v)),
        }
    }

    /// Canonical textual form. Two predicates with the same query accept the
    /// same tagsets; used as part of memoization scope identity.
    pub fn query(&self) -> String {
        match self {
            Predicate::All(ps) if ps.is_empty() => "true".to_string(),
            Predicate::Any(ps) if ps.is_empty() => "false".to_string(),
            Predicate::All(ps) => join_query(ps, " and "),
            Predicate::Any(ps) => join_query(ps, " or "),
            Predicate::Not(p) => format!("not {}", p.query()),
            Predicate::Equals { key, value } => format!("{key} = {value:?}"),
            Predicate::In { key, values } => {
                let quoted: Vec<String> = values.iter().map(|v| format!("{v:?}")).collect();
                format!("{key} in ({})", quoted.join(", "))
            }
        }
    }
}

fn join_query(ps: &[Predicate], sep: &str) -> String {
    let parts: Vec<String> = ps.iter().map(|p| format!("({})", p.query())).collect();
    parts.join(sep)
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::always()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_combinators() {
        let ts = TagSet::from([("dc", "A"), ("host", "1")]);
        assert!(Predicate::always().apply(&ts));
        assert!(!Predicate::Any(vec![]).apply(&ts));
        assert!(Predicate::equals("dc", "A").apply(&ts));
        assert!(!Predicate::equals("env", "prod").apply(&ts));
        let p = Predicate::In {
            key: "host".into(),
            values: vec!["2".into(), "1".into()],
        };
        assert!(p.apply(&ts));
        assert!(!Predicate::Not(Box::new(p)).apply(&ts));
    }

    #[test]
    fn and_flattens_trivial_sides() {
        let p = Predicate::equals("dc", "A");
        assert_eq!(Predicate::always().and(p.clone()), p);
        assert_eq!(p.clone().and(Predicate::always()), p);
        assert_eq!(
            p.clone().and(Predicate::equals("host", "1")).query(),
            "(dc = \"A\") and (host = \"1\")"
        );
    }
}
