//! Strongly typed identifiers shared across the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Player identifier. `0` is reserved for world-owned objects.
    PlayerId(u64)
);
id_type!(
    /// Host-assigned structure (building) id. `0` means "not part of a structure".
    StructureId(u32)
);
id_type!(ObjectId(u64));
id_type!(ObjectTypeId(u32));
id_type!(
    /// Unit a quota is measured against: either a raw object type or a synthetic group.
    CategoryId(u32)
);

impl PlayerId {
    pub const NONE: PlayerId = PlayerId(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl StructureId {
    pub const NONE: StructureId = StructureId(0);

    pub fn is_some(self) -> bool {
        self.0 != 0
    }

    /// Maps the host's `0` sentinel to `None`.
    pub fn non_zero(self) -> Option<StructureId> {
        self.is_some().then_some(self)
    }
}

impl From<ObjectTypeId> for CategoryId {
    fn from(value: ObjectTypeId) -> Self {
        CategoryId(value.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ids_are_sentinels() {
        assert!(!PlayerId::NONE.is_valid());
        assert!(PlayerId(42).is_valid());
        assert_eq!(StructureId(0).non_zero(), None);
        assert_eq!(StructureId(3).non_zero(), Some(StructureId(3)));
    }

    #[test]
    fn ids_serialize_as_bare_numbers() {
        let json = serde_json::to_string(&PlayerId(76561198000000001)).unwrap();
        assert_eq!(json, "76561198000000001");
        let back: StructureId = serde_json::from_str("17").unwrap();
        assert_eq!(back, StructureId(17));
    }
}
