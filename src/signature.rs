//! Structural identity keys.
//!
//! Two declarations with equal signatures are the same declaration as far as a
//! [`Repository`](crate::repository::Repository) is concerned. Signatures are
//! upper-case strings, so equality is case-insensitive and ordering is
//! lexicographic on the normalized form.

use serde::Serialize;
use std::fmt;

use crate::names::CanonicalName;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    /// Signature derived directly from an identifier.
    pub fn of(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_uppercase())
    }

    /// Signature of a primitive type tag; nullable types append `?`.
    pub fn type_tag(tag: &str, nullable: bool) -> Self {
        let mut uid = tag.trim().to_uppercase();
        if nullable {
            uid.push('?');
        }
        Self(uid)
    }

    /// `NAME[?]<m1,m2,...>`, order-sensitive. Structurally identical
    /// composites collapse to the same signature.
    pub fn structured(name: &str, nullable: bool, members: &[Signature]) -> Self {
        let head = Self::type_tag(name, nullable);
        Self(format!("{}<{}>", head.0, Self::joined(members)))
    }

    /// Signature of a positional parameter list: `(m1,m2,...)`.
    pub fn list(members: &[Signature]) -> Self {
        Self(format!("({})", Self::joined(members)))
    }

    /// Signature of a named parameter list: `(A:m1,B:m2,...)`.
    pub fn named_list<'a, I>(members: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a Signature)>,
    {
        let body = members
            .into_iter()
            .map(|(name, sig)| format!("{}:{}", name.trim().to_uppercase(), sig.0))
            .collect::<Vec<_>>()
            .join(",");
        Self(format!("({})", body))
    }

    pub fn uid(&self) -> &str {
        &self.0
    }

    fn joined(members: &[Signature]) -> String {
        members
            .iter()
            .map(|m| m.0.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&CanonicalName> for Signature {
    fn from(name: &CanonicalName) -> Self {
        Self::of(name.full_id())
    }
}

/// Anything storable by signature: rules, operators, functions, types,
/// symbols and data-object definitions.
pub trait Signed {
    fn signature(&self) -> Signature;
    /// The name the declaration is indexed under in its scope.
    fn name(&self) -> &CanonicalName;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_identity() {
        assert_eq!(Signature::of("Number"), Signature::of("NUMBER"));
        assert_eq!(Signature::type_tag("number", true).uid(), "NUMBER?");
    }

    #[test]
    fn structured_signatures_are_order_sensitive() {
        let a = Signature::of("NUMBER");
        let b = Signature::of("TEXT");
        let ab = Signature::structured("tuple", false, &[a.clone(), b.clone()]);
        let ba = Signature::structured("tuple", false, &[b, a.clone()]);
        assert_eq!(ab.uid(), "TUPLE<NUMBER,TEXT>");
        assert_ne!(ab, ba);
        assert_eq!(
            Signature::structured("list", true, &[a]).uid(),
            "LIST?<NUMBER>"
        );
    }

    #[test]
    fn parameter_list_signatures() {
        let n = Signature::of("number");
        let t = Signature::of("text");
        assert_eq!(Signature::list(&[n.clone(), t.clone()]).uid(), "(NUMBER,TEXT)");
        assert_eq!(
            Signature::named_list([("p1", &n), ("p2", &t)]).uid(),
            "(P1:NUMBER,P2:TEXT)"
        );
    }

    #[test]
    fn ordering_is_lexicographic() {
        let mut sigs = vec![Signature::of("b"), Signature::of("A"), Signature::of("c")];
        sigs.sort();
        let uids: Vec<_> = sigs.iter().map(Signature::uid).collect();
        assert_eq!(uids, ["A", "B", "C"]);
    }
}
