//! User and group lookup.

use tracing::{debug, info, warn};

use crate::ldap::connection::{load_directory_tls, BindOutcome, DirectoryConnection, DirectoryTls};
use crate::ldap::DirectoryBindConfig;
use crate::AuthError;

/// Attributes requested for a user entry.
const USER_ATTRIBUTES: [&str; 2] = ["dn", "memberOf"];

/// Attribute listing the groups a user belongs to.
const MEMBER_OF: &str = "memberOf";

/// A user entry resolved in the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserGroups {
    /// Distinguished name of the user, empty if no unique entry was found.
    pub user_dn: String,
    /// Common names of the groups the user belongs to.
    pub groups: Vec<String>,
}

impl UserGroups {
    /// Whether a unique user entry was found.
    pub fn is_found(&self) -> bool {
        !self.user_dn.is_empty()
    }
}

/// Substitutes the escaped username into a filter template's `%s` slot.
pub fn build_search_filter(template: &str, username: &str) -> Result<String, AuthError> {
    if template.matches("%s").count() != 1 {
        return Err(AuthError::Configuration(format!(
            "user search filter '{template}' must contain exactly one %s"
        )));
    }
    Ok(template.replacen("%s", &ldap3::ldap_escape(username), 1))
}

/// Returns the value of a leading `cn=` component of a DN.
///
/// `cn=alice,ou=users,dc=example,dc=com` yields `alice`. Anything that does
/// not start with a `cn=` component followed by further components is
/// returned unchanged.
pub fn extract_cn(dn: &str) -> &str {
    let Some(prefix) = dn.get(..3) else {
        return dn;
    };
    if !prefix.eq_ignore_ascii_case("cn=") {
        return dn;
    }

    let rest = &dn[3..];
    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' if i > 0 => return &rest[..i],
            ',' => return dn,
            _ => {},
        }
    }
    dn
}

/// Looks `username` up under each configured base DN, binding with the
/// service identity.
///
/// The first base DN returning exactly one entry wins. When none does, the
/// returned [`UserGroups`] is empty and no error is raised.
pub async fn get_ldap_user_groups(
    config: &DirectoryBindConfig,
    username: &str,
) -> Result<UserGroups, AuthError> {
    let tls = load_directory_tls(config)?;
    resolve_user(config, &tls, username).await
}

pub(crate) async fn resolve_user(
    config: &DirectoryBindConfig,
    tls: &DirectoryTls,
    username: &str,
) -> Result<UserGroups, AuthError> {
    let filter = build_search_filter(&config.user_search_filter, username)?;

    let mut conn = DirectoryConnection::open(config, tls).await?;
    let result = lookup(&mut conn, config, &filter, username).await;
    conn.close().await;
    result
}

async fn lookup(
    conn: &mut DirectoryConnection,
    config: &DirectoryBindConfig,
    filter: &str,
    username: &str,
) -> Result<UserGroups, AuthError> {
    if conn.bind(&config.bind_dn, &config.bind_password).await? == BindOutcome::Rejected {
        return Err(AuthError::Directory(format!(
            "service bind as '{}' rejected",
            config.bind_dn
        )));
    }

    for base in &config.user_search_base_dns {
        let mut entries = conn.search(base, filter, &USER_ATTRIBUTES).await?;
        if entries.len() != 1 {
            debug!(user = %username, base = %base, entries = entries.len(), "No unique user entry");
            continue;
        }

        let mut entry = entries.remove(0);
        let groups = entry
            .attrs
            .remove(MEMBER_OF)
            .unwrap_or_default()
            .iter()
            .map(|dn| extract_cn(dn).to_string())
            .collect::<Vec<_>>();

        info!(user = %username, dn = %entry.dn, groups = groups.len(), "Resolved directory user");
        return Ok(UserGroups {
            user_dn: entry.dn,
            groups,
        });
    }

    warn!(user = %username, "User does not exist or is ambiguous in every search base");
    Ok(UserGroups::default())
}
