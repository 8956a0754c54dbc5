//! # Entity Identifiers
//!
//! Typed identifiers for the entities an event can concern.
//!
//! Each entity type has its own identifier struct. [`EntityIdentifiers`] is the
//! tagged union that travels inside events; its JSON form is externally tagged
//! (`{"application_ids": {"application_id": "foo"}}`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kinds of entities that can be referenced by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Application,
    Client,
    EndDevice,
    Gateway,
    Organization,
    User,
}

impl EntityType {
    /// All entity types, in index order.
    pub const ALL: [EntityType; 6] = [
        EntityType::Application,
        EntityType::Client,
        EntityType::EndDevice,
        EntityType::Gateway,
        EntityType::Organization,
        EntityType::User,
    ];
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityType::Application => "application",
            EntityType::Client => "client",
            EntityType::EndDevice => "end device",
            EntityType::Gateway => "gateway",
            EntityType::Organization => "organization",
            EntityType::User => "user",
        };
        write!(f, "{}", s)
    }
}

/// Identifies an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationIdentifiers {
    pub application_id: String,
}

impl ApplicationIdentifiers {
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
        }
    }
}

/// Identifies an OAuth client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientIdentifiers {
    pub client_id: String,
}

impl ClientIdentifiers {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }
}

/// Identifies an end device. Device IDs are scoped to their application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndDeviceIdentifiers {
    pub application_ids: ApplicationIdentifiers,
    pub device_id: String,
    /// Hex-encoded DevEUI, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_eui: Option<String>,
}

impl EndDeviceIdentifiers {
    pub fn new(application_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            application_ids: ApplicationIdentifiers::new(application_id),
            device_id: device_id.into(),
            dev_eui: None,
        }
    }

    pub fn with_dev_eui(mut self, dev_eui: impl Into<String>) -> Self {
        self.dev_eui = Some(dev_eui.into());
        self
    }
}

/// Identifies a gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GatewayIdentifiers {
    pub gateway_id: String,
    /// Hex-encoded gateway EUI, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eui: Option<String>,
}

impl GatewayIdentifiers {
    pub fn new(gateway_id: impl Into<String>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            eui: None,
        }
    }
}

/// Identifies an organization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrganizationIdentifiers {
    pub organization_id: String,
}

impl OrganizationIdentifiers {
    pub fn new(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
        }
    }
}

/// Identifies a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserIdentifiers {
    pub user_id: String,
}

impl UserIdentifiers {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Identifiers of any entity that an event may concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityIdentifiers {
    #[serde(rename = "application_ids")]
    Application(ApplicationIdentifiers),
    #[serde(rename = "client_ids")]
    Client(ClientIdentifiers),
    #[serde(rename = "device_ids")]
    EndDevice(EndDeviceIdentifiers),
    #[serde(rename = "gateway_ids")]
    Gateway(GatewayIdentifiers),
    #[serde(rename = "organization_ids")]
    Organization(OrganizationIdentifiers),
    #[serde(rename = "user_ids")]
    User(UserIdentifiers),
}

impl EntityIdentifiers {
    /// The entity type these identifiers refer to.
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityIdentifiers::Application(_) => EntityType::Application,
            EntityIdentifiers::Client(_) => EntityType::Client,
            EntityIdentifiers::EndDevice(_) => EntityType::EndDevice,
            EntityIdentifiers::Gateway(_) => EntityType::Gateway,
            EntityIdentifiers::Organization(_) => EntityType::Organization,
            EntityIdentifiers::User(_) => EntityType::User,
        }
    }

    /// Canonical key of the entity, unique within its entity type.
    ///
    /// End devices are scoped by their application: `"<application_id>.<device_id>"`.
    #[must_use]
    pub fn unique_id(&self) -> String {
        match self {
            EntityIdentifiers::Application(ids) => ids.application_id.clone(),
            EntityIdentifiers::Client(ids) => ids.client_id.clone(),
            EntityIdentifiers::EndDevice(ids) => {
                format!("{}.{}", ids.application_ids.application_id, ids.device_id)
            }
            EntityIdentifiers::Gateway(ids) => ids.gateway_id.clone(),
            EntityIdentifiers::Organization(ids) => ids.organization_id.clone(),
            EntityIdentifiers::User(ids) => ids.user_id.clone(),
        }
    }

    /// The owning entity, if this entity type has one.
    ///
    /// Only end devices have a parent (their application). Other parent
    /// relations must be declared explicitly by callers.
    #[must_use]
    pub fn parent(&self) -> Option<EntityIdentifiers> {
        match self {
            EntityIdentifiers::EndDevice(ids) => {
                Some(EntityIdentifiers::Application(ids.application_ids.clone()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for EntityIdentifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}`", self.entity_type(), self.unique_id())
    }
}

impl From<ApplicationIdentifiers> for EntityIdentifiers {
    fn from(ids: ApplicationIdentifiers) -> Self {
        EntityIdentifiers::Application(ids)
    }
}

impl From<ClientIdentifiers> for EntityIdentifiers {
    fn from(ids: ClientIdentifiers) -> Self {
        EntityIdentifiers::Client(ids)
    }
}

impl From<EndDeviceIdentifiers> for EntityIdentifiers {
    fn from(ids: EndDeviceIdentifiers) -> Self {
        EntityIdentifiers::EndDevice(ids)
    }
}

impl From<GatewayIdentifiers> for EntityIdentifiers {
    fn from(ids: GatewayIdentifiers) -> Self {
        EntityIdentifiers::Gateway(ids)
    }
}

impl From<OrganizationIdentifiers> for EntityIdentifiers {
    fn from(ids: OrganizationIdentifiers) -> Self {
        EntityIdentifiers::Organization(ids)
    }
}

impl From<UserIdentifiers> for EntityIdentifiers {
    fn from(ids: UserIdentifiers) -> Self {
        EntityIdentifiers::User(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_device_unique_id_is_scoped() {
        let ids = EntityIdentifiers::from(EndDeviceIdentifiers::new("foo", "d1"));
        assert_eq!(ids.entity_type(), EntityType::EndDevice);
        assert_eq!(ids.unique_id(), "foo.d1");
    }

    #[test]
    fn test_parent_of_end_device_is_application() {
        let ids = EntityIdentifiers::from(EndDeviceIdentifiers::new("foo", "d1"));
        assert_eq!(
            ids.parent(),
            Some(EntityIdentifiers::Application(ApplicationIdentifiers::new(
                "foo"
            )))
        );

        let gtw = EntityIdentifiers::from(GatewayIdentifiers::new("gtw"));
        assert_eq!(gtw.parent(), None);
    }

    #[test]
    fn test_serialization_is_tagged() {
        let ids = EntityIdentifiers::from(ApplicationIdentifiers::new("foo"));
        let json = serde_json::to_string(&ids).unwrap();
        assert_eq!(json, r#"{"application_ids":{"application_id":"foo"}}"#);

        let back: EntityIdentifiers = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ids);
    }

    #[test]
    fn test_display() {
        let ids = EntityIdentifiers::from(GatewayIdentifiers::new("gtw-1"));
        assert_eq!(ids.to_string(), "gateway `gtw-1`");
    }
}
