//! Derives frontend feature flags from the capability routes the user
//! service grants to the current credential.
//!
//! Each route whose path starts with `/` contributes flags for the domain
//! named by its first path segment: `GET` yields `<domain>.read`, any of
//! `POST`, `PUT`, `PATCH`, `DELETE` yields `<domain>.write`.
//!
//! A route whose path does not start with `/` (for example `*`) is the
//! privileged-account shortcut: it grants every flag. Responses that carry
//! the wildcard sentinel instead of a grant list are treated the same way.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

const WRITE_METHODS: [&str; 4] = ["POST", "PUT", "PATCH", "DELETE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PermissionDomain {
    Settings,
    Users,
    Roles,
    Finance,
    Meal,
    Backups,
}

impl PermissionDomain {
    pub const ALL: [Self; 6] = [
        Self::Settings,
        Self::Users,
        Self::Roles,
        Self::Finance,
        Self::Meal,
        Self::Backups,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Settings => "settings",
            Self::Users => "users",
            Self::Roles => "roles",
            Self::Finance => "finance",
            Self::Meal => "meal",
            Self::Backups => "backups",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|domain| domain.as_str() == raw)
    }

    #[must_use]
    pub fn read(self) -> FrontendPermission {
        FrontendPermission {
            domain: self,
            access: Access::Read,
        }
    }

    #[must_use]
    pub fn write(self) -> FrontendPermission {
        FrontendPermission {
            domain: self,
            access: Access::Write,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// One of the twelve `<domain>.<read|write>` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrontendPermission {
    pub domain: PermissionDomain,
    pub access: Access,
}

impl FrontendPermission {
    pub const SETTINGS_READ: Self = Self::new(PermissionDomain::Settings, Access::Read);
    pub const SETTINGS_WRITE: Self = Self::new(PermissionDomain::Settings, Access::Write);
    pub const USERS_READ: Self = Self::new(PermissionDomain::Users, Access::Read);
    pub const USERS_WRITE: Self = Self::new(PermissionDomain::Users, Access::Write);
    pub const ROLES_READ: Self = Self::new(PermissionDomain::Roles, Access::Read);
    pub const ROLES_WRITE: Self = Self::new(PermissionDomain::Roles, Access::Write);
    pub const FINANCE_READ: Self = Self::new(PermissionDomain::Finance, Access::Read);
    pub const FINANCE_WRITE: Self = Self::new(PermissionDomain::Finance, Access::Write);
    pub const MEAL_READ: Self = Self::new(PermissionDomain::Meal, Access::Read);
    pub const MEAL_WRITE: Self = Self::new(PermissionDomain::Meal, Access::Write);
    pub const BACKUPS_READ: Self = Self::new(PermissionDomain::Backups, Access::Read);
    pub const BACKUPS_WRITE: Self = Self::new(PermissionDomain::Backups, Access::Write);

    #[must_use]
    pub const fn new(domain: PermissionDomain, access: Access) -> Self {
        Self { domain, access }
    }

    pub fn all() -> impl Iterator<Item = Self> {
        PermissionDomain::ALL
            .into_iter()
            .flat_map(|domain| [domain.read(), domain.write()])
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (domain, access) = raw.trim().split_once('.')?;
        let domain = PermissionDomain::parse(domain)?;
        match access {
            "read" => Some(domain.read()),
            "write" => Some(domain.write()),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrontendPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.domain.as_str(), self.access.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityRoute {
    pub path: String,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_filters: Option<serde_json::Value>,
}

impl CapabilityRoute {
    pub fn new<I, S>(path: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            methods: methods.into_iter().map(Into::into).collect(),
            json_filters: None,
        }
    }

    fn allows(&self, method: &str) -> bool {
        self.methods
            .iter()
            .any(|candidate| candidate.trim().eq_ignore_ascii_case(method))
    }
}

/// A role's worth of routes, as listed by `GET /permissions/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PermissionGrant {
    #[serde(default)]
    pub routes: Vec<CapabilityRoute>,
}

/// The capability list for the current credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capabilities {
    /// Full access; equivalent to every flag being granted explicitly.
    Wildcard,
    Grants(Vec<PermissionGrant>),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DerivationError {
    #[error("unknown permission group `{group}` in route `{path}`")]
    UnknownDomain { group: String, path: String },
}

/// What a single route contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteFlags {
    Everything,
    Domain {
        domain: PermissionDomain,
        read: bool,
        write: bool,
    },
}

pub fn route_flags(route: &CapabilityRoute) -> Result<RouteFlags, DerivationError> {
    let Some(rest) = route.path.strip_prefix('/') else {
        return Ok(RouteFlags::Everything);
    };
    let group = rest.split('/').next().unwrap_or_default();
    let domain = PermissionDomain::parse(group).ok_or_else(|| DerivationError::UnknownDomain {
        group: group.to_string(),
        path: route.path.clone(),
    })?;
    Ok(RouteFlags::Domain {
        domain,
        read: route.allows("GET"),
        write: WRITE_METHODS.iter().any(|method| route.allows(method)),
    })
}

/// Set of derived flags. Iteration order carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PermissionSet {
    flags: BTreeSet<FrontendPermission>,
}

impl PermissionSet {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn everything() -> Self {
        FrontendPermission::all().collect()
    }

    #[must_use]
    pub fn contains(&self, permission: FrontendPermission) -> bool {
        self.flags.contains(&permission)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = FrontendPermission> + '_ {
        self.flags.iter().copied()
    }

    fn insert(&mut self, permission: FrontendPermission) {
        self.flags.insert(permission);
    }
}

impl FromIterator<FrontendPermission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = FrontendPermission>>(iter: T) -> Self {
        Self {
            flags: iter.into_iter().collect(),
        }
    }
}

#[must_use]
pub fn has_permission(permission: FrontendPermission, permissions: &PermissionSet) -> bool {
    permissions.contains(permission)
}

/// Derives the flag set. Routes naming an unknown domain are logged and
/// skipped; they never abort derivation of the remaining routes.
#[must_use]
pub fn derive_permissions(capabilities: &Capabilities) -> PermissionSet {
    let grants = match capabilities {
        Capabilities::Wildcard => return PermissionSet::everything(),
        Capabilities::Grants(grants) => grants,
    };

    let mut derived = PermissionSet::empty();
    for route in grants.iter().flat_map(|grant| grant.routes.iter()) {
        match route_flags(route) {
            Ok(RouteFlags::Everything) => return PermissionSet::everything(),
            Ok(RouteFlags::Domain {
                domain,
                read,
                write,
            }) => {
                if read {
                    derived.insert(domain.read());
                }
                if write {
                    derived.insert(domain.write());
                }
            }
            Err(error) => {
                warn!(error = %error, "skipping capability route");
            }
        }
    }
    derived
}

/// Top-level dashboard sections gated on a read flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardSection {
    Backups,
    Finance,
    Meal,
    Settings,
    Users,
}

impl DashboardSection {
    pub const ALL: [Self; 5] = [
        Self::Backups,
        Self::Finance,
        Self::Meal,
        Self::Settings,
        Self::Users,
    ];

    #[must_use]
    pub fn route(self) -> &'static str {
        match self {
            Self::Backups => "/backups",
            Self::Finance => "/finance",
            Self::Meal => "/meal",
            Self::Settings => "/settings",
            Self::Users => "/users",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Backups => "Backups",
            Self::Finance => "Finance",
            Self::Meal => "Meals",
            Self::Settings => "Settings",
            Self::Users => "Users",
        }
    }

    #[must_use]
    pub fn required_permission(self) -> FrontendPermission {
        match self {
            Self::Backups => FrontendPermission::BACKUPS_READ,
            Self::Finance => FrontendPermission::FINANCE_READ,
            Self::Meal => FrontendPermission::MEAL_READ,
            Self::Settings => FrontendPermission::SETTINGS_READ,
            Self::Users => FrontendPermission::USERS_READ,
        }
    }
}

#[must_use]
pub fn visible_sections(permissions: &PermissionSet) -> Vec<DashboardSection> {
    DashboardSection::ALL
        .into_iter()
        .filter(|section| permissions.contains(section.required_permission()))
        .collect()
}
