//! Correlation handles for asynchronous routing-engine requests.

use std::fmt;

use serde::{Deserialize, Serialize};

string_enum! {
    /// Kind of asynchronous request a handle was issued for.
    pub enum RequestKind {
        Connect => "H_CONNECT",
        Disconnect => "H_DISCONNECT",
        SetSourceState => "H_SETSOURCESTATE",
        SetSinkVolume => "H_SETSINKVOLUME",
        SetSourceVolume => "H_SETSOURCEVOLUME",
        SetSinkSoundProperty => "H_SETSINKSOUNDPROPERTY",
        SetSourceSoundProperty => "H_SETSOURCESOUNDPROPERTY",
        SetSinkNotification => "H_SETSINKNOTIFICATION",
        SetSourceNotification => "H_SETSOURCENOTIFICATION",
    }
}

/// Opaque token identifying one outstanding request to the routing engine.
///
/// The value is unique per kind among outstanding requests; the routing
/// engine echoes the handle back with the acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    pub kind: RequestKind,
    pub value: u16,
}

impl Handle {
    #[must_use]
    pub const fn new(kind: RequestKind, value: u16) -> Self {
        Self { kind, value }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.value)
    }
}
