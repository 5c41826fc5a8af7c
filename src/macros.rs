//! Internal macros for id newtypes and the permission catalog.

/// Declares a sequential integer id newtype.
///
/// The id serializes as a bare integer so it can key JSON maps.
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// The raw integer value.
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

/// Declares the ability enum with its canonical permission names.
///
/// ```rust
/// use rbac_gate::catalog::Ability;
///
/// assert_eq!(Ability::ViewProduct.as_str(), "view-product");
/// assert_eq!("edit-roles".parse::<Ability>().unwrap(), Ability::EditRoles);
/// ```
macro_rules! ability_catalog {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($variant:ident => $perm:literal),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $name {
            $(
                #[doc = concat!("`", $perm, "`")]
                $variant,
            )*
        }

        impl $name {
            /// Every ability in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),*];

            /// The permission name checked by the evaluator.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $perm,)*
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::Error;

            fn from_str(s: &str) -> $crate::error::Result<Self> {
                match s {
                    $($perm => Ok($name::$variant),)*
                    other => Err($crate::error::Error::PermissionNotFound(other.to_string())),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }
    };
}
