//! Storage abstractions for the permission graph.
//!
//! All entity tables and the three edge sets live in one [`Tables`] value.
//! A [`Storage`] backend hands out read views and runs mutations as
//! transactions: the mutation works on a copy and is committed only when it
//! returns `Ok`, so cascades are all-or-nothing.

use crate::{
    error::{Error, Result},
    permission::{Guard, Permission, PermissionId},
    product::{Product, ProductId},
    role::{Role, RoleId},
    user::{User, UserId},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

/// A many-to-many edge set between two id types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSet<L: Ord + Copy, R: Ord + Copy> {
    edges: BTreeMap<L, BTreeSet<R>>,
}

impl<L: Ord + Copy, R: Ord + Copy> Default for EdgeSet<L, R> {
    fn default() -> Self {
        Self {
            edges: BTreeMap::new(),
        }
    }
}

impl<L: Ord + Copy, R: Ord + Copy> EdgeSet<L, R> {
    /// Add an edge. Returns false if it was already present.
    pub fn insert(&mut self, left: L, right: R) -> bool {
        self.edges.entry(left).or_default().insert(right)
    }

    /// Remove an edge. Returns false if it was absent.
    pub fn remove(&mut self, left: L, right: R) -> bool {
        let Some(targets) = self.edges.get_mut(&left) else {
            return false;
        };
        let removed = targets.remove(&right);
        if targets.is_empty() {
            self.edges.remove(&left);
        }
        removed
    }

    pub fn contains(&self, left: L, right: R) -> bool {
        self.edges
            .get(&left)
            .is_some_and(|targets| targets.contains(&right))
    }

    /// Everything `left` links to.
    pub fn targets(&self, left: L) -> impl Iterator<Item = R> + '_ {
        self.edges.get(&left).into_iter().flatten().copied()
    }

    /// Everything linking to `right`.
    pub fn sources(&self, right: R) -> impl Iterator<Item = L> + '_ {
        self.edges
            .iter()
            .filter(move |(_, targets)| targets.contains(&right))
            .map(|(left, _)| *left)
    }

    /// Replace the targets of `left` with exactly `targets`.
    /// Returns whether anything changed.
    pub fn replace(&mut self, left: L, targets: BTreeSet<R>) -> bool {
        let changed = self.edges.get(&left).map_or(!targets.is_empty(), |current| current != &targets);
        if targets.is_empty() {
            self.edges.remove(&left);
        } else {
            self.edges.insert(left, targets);
        }
        changed
    }

    /// Drop every edge leaving `left`. Returns how many were removed.
    pub fn detach_left(&mut self, left: L) -> usize {
        self.edges.remove(&left).map_or(0, |targets| targets.len())
    }

    /// Drop every edge arriving at `right`. Returns how many were removed.
    pub fn detach_right(&mut self, right: R) -> usize {
        let mut removed = 0;
        self.edges.retain(|_, targets| {
            if targets.remove(&right) {
                removed += 1;
            }
            !targets.is_empty()
        });
        removed
    }

    /// Total number of edges.
    pub fn len(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Per-table id sequences. Ids are never reused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Sequences {
    permission: u64,
    role: u64,
    user: u64,
    product: u64,
}

/// The complete stored state: entity tables plus the three edge sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    pub(crate) sequences: Sequences,
    pub(crate) permissions: BTreeMap<PermissionId, Permission>,
    pub(crate) roles: BTreeMap<RoleId, Role>,
    pub(crate) users: BTreeMap<UserId, User>,
    pub(crate) products: BTreeMap<ProductId, Product>,
    pub(crate) role_permissions: EdgeSet<RoleId, PermissionId>,
    pub(crate) user_roles: EdgeSet<UserId, RoleId>,
    pub(crate) user_permissions: EdgeSet<UserId, PermissionId>,
}

impl Tables {
    pub fn permission_count(&self) -> usize {
        self.permissions.len()
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    /// Number of edges across all three edge sets.
    pub fn edge_count(&self) -> usize {
        self.role_permissions.len() + self.user_roles.len() + self.user_permissions.len()
    }

    pub fn role_permission_edges(&self) -> &EdgeSet<RoleId, PermissionId> {
        &self.role_permissions
    }

    pub fn user_role_edges(&self) -> &EdgeSet<UserId, RoleId> {
        &self.user_roles
    }

    pub fn user_permission_edges(&self) -> &EdgeSet<UserId, PermissionId> {
        &self.user_permissions
    }

    // Sequences

    pub(crate) fn next_permission_id(&mut self) -> PermissionId {
        self.sequences.permission += 1;
        PermissionId(self.sequences.permission)
    }

    pub(crate) fn next_role_id(&mut self) -> RoleId {
        self.sequences.role += 1;
        RoleId(self.sequences.role)
    }

    pub(crate) fn next_user_id(&mut self) -> UserId {
        self.sequences.user += 1;
        UserId(self.sequences.user)
    }

    pub(crate) fn next_product_id(&mut self) -> ProductId {
        self.sequences.product += 1;
        ProductId(self.sequences.product)
    }

    // Permissions

    pub(crate) fn permission(&self, id: PermissionId) -> Result<&Permission> {
        self.permissions
            .get(&id)
            .ok_or_else(|| Error::PermissionNotFound(id.to_string()))
    }

    pub(crate) fn permission_by_name(&self, name: &str, guard: &Guard) -> Option<&Permission> {
        self.permissions.values().find(|p| p.matches(name, guard))
    }

    pub(crate) fn resolve_permission(&self, name: &str, guard: &Guard) -> Result<PermissionId> {
        self.permission_by_name(name, guard)
            .map(Permission::id)
            .ok_or_else(|| Error::PermissionNotFound(name.to_string()))
    }

    /// Resolve every name or fail on the first unknown one.
    pub(crate) fn resolve_permissions<I, N>(&self, names: I, guard: &Guard) -> Result<BTreeSet<PermissionId>>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| self.resolve_permission(name.as_ref(), guard))
            .collect()
    }

    pub(crate) fn permission_names<I>(&self, ids: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = PermissionId>,
    {
        ids.into_iter()
            .filter_map(|id| self.permissions.get(&id))
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Whether any role or user links to the permission.
    pub(crate) fn permission_is_referenced(&self, id: PermissionId) -> bool {
        self.role_permissions.sources(id).next().is_some()
            || self.user_permissions.sources(id).next().is_some()
    }

    /// Detach the permission from every role and user, then drop the record.
    /// Returns the number of edges removed.
    pub(crate) fn remove_permission(&mut self, id: PermissionId) -> Result<usize> {
        self.permission(id)?;
        let detached =
            self.role_permissions.detach_right(id) + self.user_permissions.detach_right(id);
        self.permissions.remove(&id);
        Ok(detached)
    }

    // Roles

    pub(crate) fn role(&self, id: RoleId) -> Result<&Role> {
        self.roles
            .get(&id)
            .ok_or_else(|| Error::RoleNotFound(id.to_string()))
    }

    pub(crate) fn role_mut(&mut self, id: RoleId) -> Result<&mut Role> {
        self.roles
            .get_mut(&id)
            .ok_or_else(|| Error::RoleNotFound(id.to_string()))
    }

    pub(crate) fn role_by_name(&self, name: &str, guard: &Guard) -> Option<&Role> {
        self.roles
            .values()
            .find(|r| r.name() == name && r.guard() == guard)
    }

    pub(crate) fn resolve_roles<I, N>(&self, names: I, guard: &Guard) -> Result<BTreeSet<RoleId>>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                self.role_by_name(name, guard)
                    .map(Role::id)
                    .ok_or_else(|| Error::RoleNotFound(name.to_string()))
            })
            .collect()
    }

    pub(crate) fn role_permission_names(&self, id: RoleId) -> BTreeSet<String> {
        self.permission_names(self.role_permissions.targets(id))
    }

    /// Detach the role from users and permissions, then drop the record.
    pub(crate) fn remove_role(&mut self, id: RoleId) -> Result<usize> {
        self.role(id)?;
        let detached = self.role_permissions.detach_left(id) + self.user_roles.detach_right(id);
        self.roles.remove(&id);
        Ok(detached)
    }

    // Users

    pub(crate) fn user(&self, id: UserId) -> Result<&User> {
        self.users
            .get(&id)
            .ok_or_else(|| Error::UserNotFound(id.to_string()))
    }

    pub(crate) fn user_mut(&mut self, id: UserId) -> Result<&mut User> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| Error::UserNotFound(id.to_string()))
    }

    pub(crate) fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.values().find(|u| u.email() == email)
    }

    pub(crate) fn user_role_names(&self, id: UserId) -> BTreeSet<String> {
        self.user_roles
            .targets(id)
            .filter_map(|role| self.roles.get(&role))
            .map(|role| role.name().to_string())
            .collect()
    }

    pub(crate) fn user_holds_super_admin(&self, id: UserId) -> bool {
        self.user_roles
            .targets(id)
            .filter_map(|role| self.roles.get(&role))
            .any(Role::is_super_admin)
    }

    /// Whether any user still holds a `super-admin` role.
    pub(crate) fn has_super_admin_holder(&self) -> bool {
        self.users.keys().any(|&id| self.user_holds_super_admin(id))
    }

    /// Fail an edge change that took `super-admin` away from its last holder.
    pub(crate) fn retain_super_admin_holder(&self, had_holder: bool) -> Result<()> {
        if had_holder && !self.has_super_admin_holder() {
            return Err(Error::ProtectedEntity(
                "cannot remove super-admin from its last holder".to_string(),
            ));
        }
        Ok(())
    }

    /// Detach the user's role and permission edges, then drop the record.
    pub(crate) fn remove_user(&mut self, id: UserId) -> Result<usize> {
        self.user(id)?;
        let detached = self.user_roles.detach_left(id) + self.user_permissions.detach_left(id);
        self.users.remove(&id);
        Ok(detached)
    }

    // Products

    pub(crate) fn product(&self, id: ProductId) -> Result<&Product> {
        self.products
            .get(&id)
            .ok_or_else(|| Error::ProductNotFound(id.to_string()))
    }

    pub(crate) fn product_mut(&mut self, id: ProductId) -> Result<&mut Product> {
        self.products
            .get_mut(&id)
            .ok_or_else(|| Error::ProductNotFound(id.to_string()))
    }
}

/// Trait for storing and retrieving the permission graph.
///
/// Implementations must guarantee that a `read` never overlaps a
/// `transaction`: the permission cache is flushed inside the transaction and
/// consulted inside reads, which is what keeps it coherent.
pub trait Storage: Send + Sync {
    /// Run `op` against a consistent view of the tables.
    fn read<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Tables) -> Result<T>;

    /// Run `op` against a working copy and commit it only if `op` succeeds.
    fn transaction<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Tables) -> Result<T>;
}

fn poisoned<E>(_: E) -> Error {
    Error::Storage("storage lock poisoned".to_string())
}

/// In-memory storage guarded by a single reader-writer lock.
///
/// A transaction clones every table, records included, before running the
/// mutation, so write cost grows with the total number of stored entities
/// rather than with the size of the change. Fine for the thousands of
/// records a role graph holds; large product catalogs belong in a backend
/// that stages only the touched rows.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a storage preloaded with tables.
    pub fn from_tables(tables: Tables) -> Self {
        Self {
            tables: Arc::new(RwLock::new(tables)),
        }
    }

    /// Copy of the current tables.
    pub fn snapshot(&self) -> Result<Tables> {
        self.read(|tables| Ok(tables.clone()))
    }
}

impl Storage for MemoryStorage {
    fn read<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Tables) -> Result<T>,
    {
        let tables = self.tables.read().map_err(poisoned)?;
        op(&tables)
    }

    fn transaction<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Tables) -> Result<T>,
    {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let mut working = tables.clone();
        let output = op(&mut working)?;
        *tables = working;
        Ok(output)
    }
}

/// File-based storage that persists the tables as JSON (requires persistence feature).
#[cfg(feature = "persistence")]
pub mod file_storage {
    use super::*;
    use std::{
        fs::{File, OpenOptions},
        io::{BufReader, BufWriter, Write},
        path::{Path, PathBuf},
    };

    /// Storage that rewrites a JSON snapshot after every committed transaction.
    #[derive(Debug)]
    pub struct FileStorage {
        storage_path: PathBuf,
        tables: RwLock<Tables>,
    }

    impl FileStorage {
        /// Open (or create) the storage at `storage_path`.
        pub fn new(storage_path: impl AsRef<Path>) -> Result<Self> {
            let storage_path = storage_path.as_ref().to_path_buf();

            if let Some(parent) = storage_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Storage(format!("Failed to create storage directory: {e}"))
                })?;
            }

            let tables = Self::load_from_disk(&storage_path)?;

            Ok(Self {
                storage_path,
                tables: RwLock::new(tables),
            })
        }

        fn load_from_disk(path: &Path) -> Result<Tables> {
            if !path.exists() {
                return Ok(Tables::default());
            }

            let file = File::open(path)
                .map_err(|e| Error::Storage(format!("Failed to open storage file: {e}")))?;

            Ok(serde_json::from_reader(BufReader::new(file))?)
        }

        /// Write to a sibling temp file and rename over the target.
        fn save_to_disk(&self, tables: &Tables) -> Result<()> {
            let temp_path = self.storage_path.with_extension("json.tmp");
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(|e| Error::Storage(format!("Failed to create storage file: {e}")))?;

            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, tables)?;
            writer
                .flush()
                .map_err(|e| Error::Storage(format!("Failed to write storage file: {e}")))?;

            std::fs::rename(&temp_path, &self.storage_path)
                .map_err(|e| Error::Storage(format!("Failed to replace storage file: {e}")))
        }

        /// Get the storage file path.
        pub fn storage_path(&self) -> &Path {
            &self.storage_path
        }
    }

    impl Storage for FileStorage {
        fn read<T, F>(&self, op: F) -> Result<T>
        where
            F: FnOnce(&Tables) -> Result<T>,
        {
            let tables = self.tables.read().map_err(poisoned)?;
            op(&tables)
        }

        fn transaction<T, F>(&self, op: F) -> Result<T>
        where
            F: FnOnce(&mut Tables) -> Result<T>,
        {
            let mut tables = self.tables.write().map_err(poisoned)?;
            let mut working = tables.clone();
            let output = op(&mut working)?;
            self.save_to_disk(&working)?;
            *tables = working;
            Ok(output)
        }
    }
}

#[cfg(feature = "persistence")]
pub use file_storage::FileStorage;
