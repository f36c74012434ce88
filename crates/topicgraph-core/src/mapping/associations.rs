//! Association scopes for forward mapping.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Sub};

use serde::{Deserialize, Serialize};

/// A set of association categories a mapping call should follow.
///
/// Scalar properties are always mapped; every other property belongs to
/// exactly one category and is only mapped when that category is requested.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssociationTypes(u8);

impl AssociationTypes {
    pub const NONE: Self = Self(0);
    pub const CHILDREN: Self = Self(1);
    pub const RELATIONSHIPS: Self = Self(1 << 1);
    pub const INCOMING_RELATIONSHIPS: Self = Self(1 << 2);
    pub const REFERENCES: Self = Self(1 << 3);
    pub const MAPPED_COLLECTIONS: Self = Self(1 << 4);
    pub const PARENTS: Self = Self(1 << 5);
    pub const ALL: Self = Self(0b11_1111);

    const NAMED: [(&'static str, Self); 6] = [
        ("Children", Self::CHILDREN),
        ("Relationships", Self::RELATIONSHIPS),
        ("IncomingRelationships", Self::INCOMING_RELATIONSHIPS),
        ("References", Self::REFERENCES),
        ("MappedCollections", Self::MAPPED_COLLECTIONS),
        ("Parents", Self::PARENTS),
    ];

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every category in `other` is in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Parse a single category name, or `All`/`None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "All" => Some(Self::ALL),
            "None" => Some(Self::NONE),
            _ => Self::NAMED
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, value)| *value),
        }
    }

    /// Names of the categories in this set.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(_, value)| self.contains(*value))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl BitOr for AssociationTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AssociationTypes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for AssociationTypes {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Categories in `self` that are not in `rhs`.
impl Sub for AssociationTypes {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 & !rhs.0)
    }
}

impl fmt::Debug for AssociationTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("AssociationTypes(None)");
        }
        write!(f, "AssociationTypes({})", self.names().join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_operations() {
        let scope = AssociationTypes::CHILDREN | AssociationTypes::RELATIONSHIPS;
        assert!(scope.contains(AssociationTypes::CHILDREN));
        assert!(!scope.contains(AssociationTypes::REFERENCES));
        assert!(AssociationTypes::ALL.contains(scope));

        let missing = AssociationTypes::ALL - scope;
        assert!(!missing.intersects(scope));
        assert_eq!(missing | scope, AssociationTypes::ALL);
    }

    #[test]
    fn test_parse_and_names() {
        assert_eq!(
            AssociationTypes::parse("IncomingRelationships"),
            Some(AssociationTypes::INCOMING_RELATIONSHIPS)
        );
        assert_eq!(AssociationTypes::parse("All"), Some(AssociationTypes::ALL));
        assert_eq!(AssociationTypes::parse("Siblings"), None);
        assert_eq!(AssociationTypes::ALL.names().len(), 6);
    }
}
