use crate::db::{encode, non_blank, now_timestamp, Database};
use crate::error::{StoreError, StoreResult};
use crate::models::Profile;
use crate::schema::PROFILES;

impl Database {
    // --- Profile operations ---

    pub fn create_profile(&self, profile: &Profile) -> StoreResult<i64> {
        let mut profile = profile.clone();
        profile.id = None;
        validate(&profile)?;
        if profile.created_at.is_empty() {
            profile.created_at = now_timestamp();
        }
        self.kv().add(PROFILES, encode(&profile)?)
    }

    pub fn get_profile(&self, id: i64) -> StoreResult<Option<Profile>> {
        self.fetch(PROFILES, id)
    }

    /// Full replace keyed by `profile.id`. `created_at` keeps its stored value.
    pub fn update_profile(&self, profile: &Profile) -> StoreResult<()> {
        let id = profile
            .id
            .ok_or_else(|| StoreError::constraint(PROFILES, "update requires an id"))?;
        let existing: Profile = self.fetch_existing(PROFILES, id)?;
        validate(profile)?;

        let mut profile = profile.clone();
        profile.created_at = existing.created_at;
        self.kv().put(PROFILES, encode(&profile)?)?;
        Ok(())
    }

    pub fn list_profiles(&self) -> StoreResult<Vec<Profile>> {
        self.fetch_all(PROFILES)
    }

    /// Removes the profile record only. Callers go through
    /// [`Database::delete_profile`], which unlinks dependent jobs first.
    pub(crate) fn remove_profile_record(&self, id: i64) -> StoreResult<()> {
        if self.kv().delete(PROFILES, id)? {
            Ok(())
        } else {
            Err(StoreError::not_found(PROFILES, id))
        }
    }
}

pub(crate) fn validate(profile: &Profile) -> StoreResult<()> {
    if non_blank(Some(profile.content.as_str())).is_none() {
        return Err(StoreError::constraint(PROFILES, "resume content is required"));
    }
    Ok(())
}
