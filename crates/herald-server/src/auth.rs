// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Caller principals and the directory that resolves them. The heavy
//! lifting (credential checking) happened at the broker before a message
//! ever reaches us; this layer only maps the validated name to a
//! permissioned record.

use std::collections::{BTreeSet, HashMap};

/// Wildcard permission carried by the node's own principal.
pub const ALL_PERMISSIONS: &str = "ALL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPrincipal {
    pub name: String,
    pub permissions: BTreeSet<String>,
}

impl UserPrincipal {
    pub fn new(name: &str, permissions: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: name.to_string(),
            permissions: permissions.into_iter().collect(),
        }
    }

    /// The principal substituted when the broker-validated name is the
    /// node's own legal identity and no directory record exists for it.
    pub fn node(legal_name: &str) -> Self {
        Self::new(legal_name, [ALL_PERMISSIONS.to_string()])
    }

    pub fn is_permitted(&self, permission: &str) -> bool {
        self.permissions.contains(ALL_PERMISSIONS) || self.permissions.contains(permission)
    }
}

/// External user-authentication service: resolves a broker-validated name to
/// a permissioned user record.
pub trait UserDirectory: Send + Sync {
    fn resolve(&self, name: &str) -> Option<UserPrincipal>;
}

/// Directory over a fixed user set, for embedders with static configuration
/// and for tests.
#[derive(Default)]
pub struct StaticUserDirectory {
    users: HashMap<String, UserPrincipal>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, principal: UserPrincipal) -> Self {
        self.users.insert(principal.name.clone(), principal);
        self
    }
}

impl UserDirectory for StaticUserDirectory {
    fn resolve(&self, name: &str) -> Option<UserPrincipal> {
        self.users.get(name).cloned()
    }
}
