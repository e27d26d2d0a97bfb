use std::collections::HashMap;
use std::sync::RwLock;

use fulfil_core::UserId;
use fulfil_sales::{UserProfile, UserProfiles};

#[derive(Debug, Default)]
pub struct InMemoryUserProfiles {
    profiles: RwLock<HashMap<UserId, UserProfile>>,
}

impl InMemoryUserProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, user_id: UserId, profile: UserProfile) {
        if let Ok(mut map) = self.profiles.write() {
            map.insert(user_id, profile);
        }
    }
}

impl UserProfiles for InMemoryUserProfiles {
    fn profile(&self, user_id: &UserId) -> Option<UserProfile> {
        let map = self.profiles.read().ok()?;
        map.get(user_id).cloned()
    }
}
