//! Membership-scanning profile normalizer
//!
//! Reads the external id and display name from configured endpoint fields,
//! then derives grants:
//!
//! - administrator, when the external id is in the configured admin list
//! - otherwise member, when any entry of the membership list (e.g. the
//!   user's characters) joins to the configured target key (e.g.
//!   `"Knights:Argent Dawn"` from `guild` + `guildRealm`)
//!
//! A missing or non-matching membership list yields no grant.

use serde_json::Value;

use super::{scalar_to_string, ProfileNormalizer, RawResponses};
use crate::config::{FieldRef, GrantSettings, MembershipSettings, ProfileSettings};
use crate::error::{SsoError, SsoResult};
use crate::identity::{CanonicalIdentity, RoleTag};

/// Normalizer driven by [`ProfileSettings`]
#[derive(Debug, Clone)]
pub struct GuildProfileNormalizer {
    profile: ProfileSettings,
    grants: GrantSettings,
}

impl GuildProfileNormalizer {
    /// Create a normalizer from the profile and grant settings
    #[must_use]
    pub const fn new(profile: ProfileSettings, grants: GrantSettings) -> Self {
        Self { profile, grants }
    }

    fn field(raw: &RawResponses, field: &FieldRef) -> SsoResult<Option<String>> {
        let json = raw.json(&field.endpoint)?;
        Ok(json.get(&field.field).and_then(scalar_to_string))
    }

    fn membership_key(entry: &Value, membership: &MembershipSettings) -> Option<String> {
        let parts = membership
            .key_fields
            .iter()
            .map(|name| entry.get(name).and_then(scalar_to_string))
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join(&membership.separator))
    }

    fn is_member(&self, raw: &RawResponses) -> SsoResult<bool> {
        let membership = &self.profile.membership;
        let Some(target) = membership.target.as_deref() else {
            return Ok(false);
        };
        if raw.get(&membership.endpoint).is_none() {
            return Ok(false);
        }

        let json = raw.json(&membership.endpoint)?;
        let Some(entries) = json.get(&membership.list_field).and_then(Value::as_array) else {
            return Ok(false);
        };

        Ok(entries
            .iter()
            .filter_map(|entry| Self::membership_key(entry, membership))
            .any(|key| key == target))
    }
}

impl ProfileNormalizer for GuildProfileNormalizer {
    fn normalize(&self, raw: &RawResponses) -> SsoResult<CanonicalIdentity> {
        let external_id = Self::field(raw, &self.profile.external_id)?
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                SsoError::MalformedResponse(format!(
                    "{} endpoint response has no {:?} field",
                    self.profile.external_id.endpoint, self.profile.external_id.field
                ))
            })?;

        let display_name = Self::field(raw, &self.profile.display_name)?
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| external_id.clone());

        let email = match &self.profile.email {
            Some(field) => Self::field(raw, field)?.unwrap_or_default(),
            None => String::new(),
        };

        let is_admin = self
            .profile
            .admin_external_ids
            .iter()
            .any(|admin| *admin == external_id);

        let mut identity = CanonicalIdentity::new(external_id, display_name)?.with_email(email);
        if is_admin {
            identity = identity.with_grant(RoleTag::new(&self.grants.admin_role));
        } else if self.is_member(raw)? {
            identity = identity.with_grant(RoleTag::new(&self.grants.member_role));
        }

        Ok(identity)
    }
}
