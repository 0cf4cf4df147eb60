//! Wire protocol shared between the tiffin realtime broker and its clients.
//! Keeping this in a dedicated crate lets the dashboard, the mobile shell and
//! the broker tooling agree on frame shapes without pulling in client runtime
//! code.

use serde::{Deserialize, Serialize};

/// Frames sent from a client to the broker. JSON text frames only; no
/// compression or binary framing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Connection handshake. Carries the session bearer token; the broker
    /// answers with `Connected` or `Error`.
    Connect { token: Option<String> },
    Subscribe { id: String, destination: String },
    Unsubscribe { id: String },
    Publish {
        destination: String,
        body: serde_json::Value,
    },
    Ping,
}

/// Frames sent from the broker to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Connected,
    /// A payload delivered for an active subscription.
    Message {
        subscription: String,
        destination: String,
        body: serde_json::Value,
    },
    Pong,
    Error { message: String },
}

/// Kind of order event carried in a `Message` body. Anything the client does
/// not recognise (including a missing `type` field) folds into `Other`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEventKind {
    NewOrder,
    StatusChange,
    #[default]
    #[serde(other)]
    Other,
}

/// Order event payload published by the order service. Unknown fields are
/// ignored; optional fields default to `None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    #[serde(rename = "type", default)]
    pub kind: OrderEventKind,
    pub order_id: i64,
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub new_status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl OrderEvent {
    /// Parse an event out of a `Message` body.
    pub fn from_body(body: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(body)
    }
}

/// Broadcast destination every instance of a vendor dashboard listens on.
pub fn vendor_topic(vendor_id: i64) -> String {
    format!("/topic/orders/vendor/{vendor_id}")
}

/// Point-to-point destination delivered only to one employee's session.
pub fn user_queue(user_id: i64) -> String {
    format!("/queue/orders/user/{user_id}")
}

/// Roles issued by the identity service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum UserRole {
    #[serde(rename = "ROLE_SUPER_ADMIN")]
    SuperAdmin,
    #[serde(rename = "ROLE_ORG_ADMIN")]
    OrgAdmin,
    #[serde(rename = "ROLE_VENDOR")]
    Vendor,
    #[serde(rename = "ROLE_EMPLOYEE")]
    Employee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: i64,
    pub role: UserRole,
}

impl UserIdentity {
    pub fn new(id: i64, role: UserRole) -> Self {
        Self { id, role }
    }
}

/// Resolve the destination an identity should subscribe to. Vendors listen on
/// their broadcast topic, employees on their private queue; admin roles have
/// no realtime order feed.
pub fn destination_for(identity: &UserIdentity) -> Option<String> {
    match identity.role {
        UserRole::Vendor => Some(vendor_topic(identity.id)),
        UserRole::Employee => Some(user_queue(identity.id)),
        UserRole::SuperAdmin | UserRole::OrgAdmin => None,
    }
}
