use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PRIMARY_DEVICE_ID: u32 = 1;
/// Version of an account that has never been written.
pub const INITIAL_VERSION: i64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Device {
    pub id: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub last_seen_millis: u64,
}

/// The part of an account the storage layer treats as opaque; it is carried in
/// the serialized payload and never indexed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountProfile {
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub discoverable_by_phone_number: bool,
    #[serde(default)]
    pub identity_key: Option<Vec<u8>>,
    #[serde(default)]
    pub unidentified_access_key: Option<Vec<u8>>,
    #[serde(default)]
    pub registration_lock: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub uuid: Uuid,
    pub number: String,
    pub phone_number_identifier: Uuid,
    pub username: Option<String>,
    /// Optimistic-locking version; advanced by the store on every successful write.
    pub version: i64,
    /// Stored copy of [`Account::should_be_visible_in_directory`] as of the last
    /// write; filled in on read.
    pub canonically_discoverable: bool,
    pub profile: AccountProfile,
}

impl Account {
    pub fn new(uuid: Uuid, number: impl Into<String>, phone_number_identifier: Uuid) -> Self {
        Self {
            uuid,
            number: number.into(),
            phone_number_identifier,
            username: None,
            version: INITIAL_VERSION,
            canonically_discoverable: false,
            profile: AccountProfile::default(),
        }
    }

    pub fn with_profile(mut self, profile: AccountProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn primary_device(&self) -> Option<&Device> {
        self.profile
            .devices
            .iter()
            .find(|d| d.id == PRIMARY_DEVICE_ID)
    }

    pub fn is_enabled(&self) -> bool {
        self.primary_device().is_some_and(|d| d.enabled)
    }

    pub fn should_be_visible_in_directory(&self) -> bool {
        self.is_enabled() && self.profile.discoverable_by_phone_number
    }
}
