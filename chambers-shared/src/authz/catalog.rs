/// Permission catalog: the closed set of permission keys and default grants
///
/// Permissions are a closed enumeration rather than free-form strings, so an
/// invalid key is a construction-time error instead of a silent `false`
/// during a runtime membership test. The database stores keys as text; they
/// are parsed back through [`PermissionKey::from_str`] when a role or
/// membership row is loaded, and unknown keys fail loudly.
///
/// # Key Format
///
/// Keys follow a `resource:action` convention, e.g. `"case:view"`,
/// `"member:invite"`. [`PermissionSet`] packs them into a bitset, which makes
/// the effective-permission computation (set union) trivially
/// order-independent.
///
/// # Example
///
/// ```
/// use chambers_shared::authz::catalog::{PermissionKey, PermissionSet};
///
/// let set = PermissionSet::from_keys(&[PermissionKey::CaseView, PermissionKey::CaseEdit]);
/// assert!(set.contains(PermissionKey::CaseView));
/// assert!(!set.contains(PermissionKey::CaseDelete));
///
/// // Parsing rejects unknown keys instead of ignoring them
/// assert!(PermissionSet::from_strs(["case:view", "bogus"]).is_err());
/// ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// An atomic, enumerable capability identifier
///
/// Each variant maps to exactly one bit in [`PermissionSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PermissionKey {
    /// View cases in the firm
    CaseView,
    /// Open new cases
    CaseCreate,
    /// Edit case details
    CaseEdit,
    /// Delete/archive cases
    CaseDelete,

    /// View client records
    ClientView,
    /// Create client records
    ClientCreate,
    /// Edit client records
    ClientEdit,
    /// Delete client records
    ClientDelete,

    /// View document metadata
    DocumentView,
    /// Register uploaded documents
    DocumentUpload,
    /// Delete documents
    DocumentDelete,

    /// View invoices
    InvoiceView,
    /// Create invoices
    InvoiceCreate,
    /// Edit invoices
    InvoiceEdit,

    /// View the firm's member list
    MemberView,
    /// Add members to the firm
    MemberInvite,
    /// Remove members from the firm
    MemberRemove,
    /// Change a member's role
    MemberEditRole,

    /// View billing/subscription state
    BillingView,
    /// Change plans, manage the subscription
    BillingManage,

    /// View reports
    ReportView,

    /// Edit firm-level settings
    FirmSettings,
}

/// All keys, in bit order. The bit index of a key is its position here.
pub const ALL_PERMISSION_KEYS: &[PermissionKey] = &[
    PermissionKey::CaseView,
    PermissionKey::CaseCreate,
    PermissionKey::CaseEdit,
    PermissionKey::CaseDelete,
    PermissionKey::ClientView,
    PermissionKey::ClientCreate,
    PermissionKey::ClientEdit,
    PermissionKey::ClientDelete,
    PermissionKey::DocumentView,
    PermissionKey::DocumentUpload,
    PermissionKey::DocumentDelete,
    PermissionKey::InvoiceView,
    PermissionKey::InvoiceCreate,
    PermissionKey::InvoiceEdit,
    PermissionKey::MemberView,
    PermissionKey::MemberInvite,
    PermissionKey::MemberRemove,
    PermissionKey::MemberEditRole,
    PermissionKey::BillingView,
    PermissionKey::BillingManage,
    PermissionKey::ReportView,
    PermissionKey::FirmSettings,
];

/// Error for unknown permission key strings
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown permission key: {0}")]
pub struct UnknownPermission(pub String);

impl PermissionKey {
    /// Key string as stored in the database and used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionKey::CaseView => "case:view",
            PermissionKey::CaseCreate => "case:create",
            PermissionKey::CaseEdit => "case:edit",
            PermissionKey::CaseDelete => "case:delete",
            PermissionKey::ClientView => "client:view",
            PermissionKey::ClientCreate => "client:create",
            PermissionKey::ClientEdit => "client:edit",
            PermissionKey::ClientDelete => "client:delete",
            PermissionKey::DocumentView => "document:view",
            PermissionKey::DocumentUpload => "document:upload",
            PermissionKey::DocumentDelete => "document:delete",
            PermissionKey::InvoiceView => "invoice:view",
            PermissionKey::InvoiceCreate => "invoice:create",
            PermissionKey::InvoiceEdit => "invoice:edit",
            PermissionKey::MemberView => "member:view",
            PermissionKey::MemberInvite => "member:invite",
            PermissionKey::MemberRemove => "member:remove",
            PermissionKey::MemberEditRole => "member:edit_role",
            PermissionKey::BillingView => "billing:view",
            PermissionKey::BillingManage => "billing:manage",
            PermissionKey::ReportView => "report:view",
            PermissionKey::FirmSettings => "firm:settings",
        }
    }

    /// Parses a key string, rejecting anything not in the catalog
    pub fn from_str(s: &str) -> Result<Self, UnknownPermission> {
        ALL_PERMISSION_KEYS
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownPermission(s.to_string()))
    }

    /// Bit index within a [`PermissionSet`]
    fn bit(&self) -> u64 {
        let idx = ALL_PERMISSION_KEYS
            .iter()
            .position(|k| k == self)
            .expect("key present in ALL_PERMISSION_KEYS");
        1u64 << idx
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for PermissionKey {
    type Error = UnknownPermission;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        PermissionKey::from_str(&s)
    }
}

impl From<PermissionKey> for String {
    fn from(key: PermissionKey) -> String {
        key.as_str().to_string()
    }
}

/// A set of permission keys packed into a bitset
///
/// Union is a single OR, which makes effective-permission computation
/// idempotent and order-independent by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionSet(u64);

impl PermissionSet {
    /// The empty set
    pub fn empty() -> Self {
        PermissionSet(0)
    }

    /// Every key in the catalog
    pub fn all() -> Self {
        let mut set = PermissionSet(0);
        for key in ALL_PERMISSION_KEYS {
            set.insert(*key);
        }
        set
    }

    /// Builds a set from a slice of keys
    pub fn from_keys(keys: &[PermissionKey]) -> Self {
        let mut set = PermissionSet(0);
        for key in keys {
            set.insert(*key);
        }
        set
    }

    /// Parses a set from raw key strings (e.g. a text[] database column)
    ///
    /// # Errors
    ///
    /// Returns `UnknownPermission` on the first key not in the catalog.
    pub fn from_strs<I, S>(strs: I) -> Result<Self, UnknownPermission>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = PermissionSet(0);
        for s in strs {
            set.insert(PermissionKey::from_str(s.as_ref())?);
        }
        Ok(set)
    }

    /// Adds a key to the set
    pub fn insert(&mut self, key: PermissionKey) {
        self.0 |= key.bit();
    }

    /// Membership test
    pub fn contains(&self, key: PermissionKey) -> bool {
        self.0 & key.bit() != 0
    }

    /// Set union
    pub fn union(&self, other: PermissionSet) -> PermissionSet {
        PermissionSet(self.0 | other.0)
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of keys in the set
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterates keys in catalog order
    pub fn iter(&self) -> impl Iterator<Item = PermissionKey> + '_ {
        ALL_PERMISSION_KEYS
            .iter()
            .copied()
            .filter(move |k| self.contains(*k))
    }

    /// Key strings, for persistence
    pub fn to_strings(&self) -> Vec<String> {
        self.iter().map(|k| k.as_str().to_string()).collect()
    }
}

impl std::ops::BitOr for PermissionSet {
    type Output = PermissionSet;

    fn bitor(self, rhs: PermissionSet) -> PermissionSet {
        self.union(rhs)
    }
}

/// Built-in role names
///
/// Built-in roles exist for every firm (their rows carry a NULL `firm_id`).
/// Firms may define additional roles with custom permission sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinRole {
    /// Full control: billing, settings, member management
    Owner,

    /// Everything except billing management
    Admin,

    /// Case work: cases, clients, documents, invoices
    Attorney,

    /// Support work: view cases/clients, handle documents
    Staff,
}

impl BuiltinRole {
    /// Role name as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinRole::Owner => "owner",
            BuiltinRole::Admin => "admin",
            BuiltinRole::Attorney => "attorney",
            BuiltinRole::Staff => "staff",
        }
    }

    /// Default permission set for this built-in role
    pub fn default_permissions(&self) -> PermissionSet {
        use PermissionKey::*;
        match self {
            BuiltinRole::Owner => PermissionSet::all(),
            BuiltinRole::Admin => {
                // Admins see billing but only owners change it
                let mut set = PermissionSet::empty();
                for key in ALL_PERMISSION_KEYS {
                    if *key != BillingManage {
                        set.insert(*key);
                    }
                }
                set
            }
            BuiltinRole::Attorney => PermissionSet::from_keys(&[
                CaseView, CaseCreate, CaseEdit, ClientView, ClientCreate, ClientEdit,
                DocumentView, DocumentUpload, DocumentDelete, InvoiceView, InvoiceCreate,
                InvoiceEdit, MemberView, ReportView,
            ]),
            BuiltinRole::Staff => PermissionSet::from_keys(&[
                CaseView, ClientView, DocumentView, DocumentUpload, MemberView,
            ]),
        }
    }
}

/// Global (platform-level) user role
///
/// Used as a fallback when a membership has no firm role attached
/// (legacy memberships created before firm-scoped roles existed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[serde(rename_all = "lowercase")]
pub enum GlobalRole {
    /// Platform administrator
    #[serde(rename = "admin")]
    Admin,

    /// Regular user
    #[serde(rename = "user")]
    User,
}

impl GlobalRole {
    /// Role name as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalRole::Admin => "admin",
            GlobalRole::User => "user",
        }
    }

    /// Parses a role from its stored string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(GlobalRole::Admin),
            "user" => Some(GlobalRole::User),
            _ => None,
        }
    }

    /// Fallback permission set when a membership carries no firm role
    pub fn fallback_permissions(&self) -> PermissionSet {
        match self {
            GlobalRole::Admin => BuiltinRole::Admin.default_permissions(),
            GlobalRole::User => PermissionSet::from_keys(&[
                PermissionKey::CaseView,
                PermissionKey::ClientView,
                PermissionKey::DocumentView,
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_roundtrip() {
        for key in ALL_PERMISSION_KEYS {
            assert_eq!(PermissionKey::from_str(key.as_str()), Ok(*key));
        }
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(PermissionKey::from_str("case:fly").is_err());
        assert!(PermissionKey::from_str("").is_err());
        assert!(PermissionKey::from_str("CASE:VIEW").is_err());
    }

    #[test]
    fn test_bits_are_unique() {
        // Fewer than 64 keys, all distinct bit positions
        assert!(ALL_PERMISSION_KEYS.len() < 64);
        let all = PermissionSet::all();
        assert_eq!(all.len(), ALL_PERMISSION_KEYS.len());
    }

    #[test]
    fn test_set_insert_and_contains() {
        let mut set = PermissionSet::empty();
        assert!(set.is_empty());

        set.insert(PermissionKey::CaseView);
        assert!(set.contains(PermissionKey::CaseView));
        assert!(!set.contains(PermissionKey::CaseEdit));
        assert_eq!(set.len(), 1);

        // Idempotent
        set.insert(PermissionKey::CaseView);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_union_is_order_independent() {
        let a = PermissionSet::from_keys(&[PermissionKey::CaseView, PermissionKey::CaseEdit]);
        let b = PermissionSet::from_keys(&[PermissionKey::CaseEdit, PermissionKey::ClientView]);

        assert_eq!(a.union(b), b.union(a));
        assert_eq!(a | b, b | a);
        assert_eq!((a | b).len(), 3);

        // Idempotent
        assert_eq!(a.union(a), a);
    }

    #[test]
    fn test_from_strs_rejects_unknown() {
        let ok = PermissionSet::from_strs(["case:view", "member:invite"]).unwrap();
        assert!(ok.contains(PermissionKey::CaseView));
        assert!(ok.contains(PermissionKey::MemberInvite));

        let err = PermissionSet::from_strs(["case:view", "not-a-key"]);
        assert_eq!(err, Err(UnknownPermission("not-a-key".to_string())));
    }

    #[test]
    fn test_to_strings_roundtrip() {
        let set = PermissionSet::from_keys(&[
            PermissionKey::DocumentUpload,
            PermissionKey::BillingView,
        ]);
        let strings = set.to_strings();
        let parsed = PermissionSet::from_strs(&strings).unwrap();
        assert_eq!(set, parsed);
    }

    #[test]
    fn test_owner_has_everything() {
        let owner = BuiltinRole::Owner.default_permissions();
        for key in ALL_PERMISSION_KEYS {
            assert!(owner.contains(*key), "owner missing {}", key);
        }
    }

    #[test]
    fn test_admin_cannot_manage_billing() {
        let admin = BuiltinRole::Admin.default_permissions();
        assert!(!admin.contains(PermissionKey::BillingManage));
        assert!(admin.contains(PermissionKey::BillingView));
        assert!(admin.contains(PermissionKey::MemberInvite));
    }

    #[test]
    fn test_staff_is_restricted() {
        let staff = BuiltinRole::Staff.default_permissions();
        assert!(staff.contains(PermissionKey::CaseView));
        assert!(!staff.contains(PermissionKey::CaseEdit));
        assert!(!staff.contains(PermissionKey::MemberInvite));
        assert!(!staff.contains(PermissionKey::BillingManage));
    }

    #[test]
    fn test_global_role_fallback() {
        let admin = GlobalRole::Admin.fallback_permissions();
        assert!(admin.contains(PermissionKey::MemberInvite));

        let user = GlobalRole::User.fallback_permissions();
        assert!(user.contains(PermissionKey::CaseView));
        assert!(!user.contains(PermissionKey::CaseEdit));
        assert!(!user.contains(PermissionKey::MemberInvite));
    }

    #[test]
    fn test_global_role_from_str() {
        assert_eq!(GlobalRole::from_str("admin"), Some(GlobalRole::Admin));
        assert_eq!(GlobalRole::from_str("user"), Some(GlobalRole::User));
        assert_eq!(GlobalRole::from_str("root"), None);
    }
}
