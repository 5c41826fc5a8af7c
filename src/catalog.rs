//! The fixed set of abilities the REST surface checks.
//!
//! Handlers refer to abilities through [`Ability`] instead of string literals,
//! so a typo is a compile error rather than a permanently denied route. The
//! stored permission records still carry plain names; [`verify_catalog`]
//! reports abilities with no matching record.
//!
//! [`verify_catalog`]: crate::seed::verify_catalog

ability_catalog! {
    /// A permission name the API layer checks before running a handler.
    pub enum Ability {
        ViewProduct => "view-product",
        CreateProduct => "create-product",
        EditProduct => "edit-product",
        DeleteProduct => "delete-product",
        ViewUsers => "view-users",
        CreateUsers => "create-users",
        EditUsers => "edit-users",
        DeleteUsers => "delete-users",
        ViewRoles => "view-roles",
        CreateRoles => "create-roles",
        EditRoles => "edit-roles",
        DeleteRoles => "delete-roles",
        ViewPermissions => "view-permissions",
        CreatePermissions => "create-permissions",
        UpdatePermissions => "update-permissions",
        DeletePermissions => "delete-permissions",
        AssignPermissions => "assign-permissions",
        RevokePermissions => "revoke-permissions",
    }
}

impl Ability {
    /// Abilities covering product records.
    pub const PRODUCT: &'static [Ability] = &[
        Ability::ViewProduct,
        Ability::CreateProduct,
        Ability::EditProduct,
        Ability::DeleteProduct,
    ];

    /// Names of every ability, in declaration order.
    pub fn names() -> impl Iterator<Item = &'static str> {
        Self::ALL.iter().map(|ability| ability.as_str())
    }
}

impl serde::Serialize for Ability {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_names_are_unique() {
        let names: BTreeSet<&str> = Ability::names().collect();
        assert_eq!(names.len(), Ability::ALL.len());
        assert_eq!(Ability::ALL.len(), 18);
    }

    #[test]
    fn test_parse_roundtrip() {
        for ability in Ability::ALL {
            assert_eq!(ability.as_str().parse::<Ability>().unwrap(), *ability);
        }
        assert!("view-products".parse::<Ability>().unwrap_err().is_not_found());
    }

    #[test]
    fn test_serializes_as_name() {
        let json = serde_json::to_string(&Ability::AssignPermissions).unwrap();
        assert_eq!(json, "\"assign-permissions\"");
    }
}
