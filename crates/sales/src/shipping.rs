use std::sync::Arc;

use serde::{Deserialize, Serialize};

use fulfil_core::{UserId, ValueObject};

/// Postal address snapshot, used for both shipping and billing.
///
/// Every field is optional because the snapshot is assembled field by field
/// from several sources.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub country: Option<String>,
    pub division: Option<String>,
    pub district: Option<String>,
    pub union_ward: Option<String>,
    pub village: Option<String>,
}

impl ValueObject for ShippingAddress {}

fn first_non_empty<'a, F>(layers: &[Option<&'a ShippingAddress>], field: F) -> Option<String>
where
    F: Fn(&'a ShippingAddress) -> &'a Option<String>,
{
    layers
        .iter()
        .flatten()
        .filter_map(|a| field(a).as_deref())
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

impl ShippingAddress {
    /// Build a snapshot taking, per field, the first non-blank value in `layers`.
    pub fn merged(layers: &[Option<&ShippingAddress>]) -> Self {
        Self {
            full_name: first_non_empty(layers, |a| &a.full_name),
            phone: first_non_empty(layers, |a| &a.phone),
            address: first_non_empty(layers, |a| &a.address),
            country: first_non_empty(layers, |a| &a.country),
            division: first_non_empty(layers, |a| &a.division),
            district: first_non_empty(layers, |a| &a.district),
            union_ward: first_non_empty(layers, |a| &a.union_ward),
            village: first_non_empty(layers, |a| &a.village),
        }
    }

    pub fn is_empty(&self) -> bool {
        Self::merged(&[Some(self)]) == Self::default()
    }
}

/// Address book entry supplied by the user/profile store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub shipping: Option<ShippingAddress>,
    pub billing: Option<ShippingAddress>,
}

/// Read-only port onto the user/profile store.
pub trait UserProfiles: Send + Sync {
    fn profile(&self, user_id: &UserId) -> Option<UserProfile>;
}

impl<S> UserProfiles for Arc<S>
where
    S: UserProfiles + ?Sized,
{
    fn profile(&self, user_id: &UserId) -> Option<UserProfile> {
        (**self).profile(user_id)
    }
}
