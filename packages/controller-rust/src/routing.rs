//! Routing engines the controller can run against without hardware:
//! [`RecordingRouting`] keeps every request for inspection and
//! [`LoopbackRouting`] acknowledges each request through the event channel.

use std::sync::Arc;

use parking_lot::Mutex;
use routing_core::types::{
    ConnectionFormat, ConnectionId, NotificationConfiguration, RampType, SinkId, SoundProperty,
    SourceId, SourceState, Volume,
};
use routing_core::{ControlError, ControlResult, Handle, RequestKind, RoutingControl};
use tokio::sync::mpsc;
use tracing::debug;

use crate::worker::ControllerEvent;

/// One request as issued to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingRequest {
    Connect {
        source: SourceId,
        sink: SinkId,
        format: ConnectionFormat,
        connection: ConnectionId,
    },
    Disconnect(ConnectionId),
    SourceState {
        source: SourceId,
        state: SourceState,
    },
    SinkVolume {
        sink: SinkId,
        volume: Volume,
        ramp: RampType,
        ramp_time_ms: u16,
    },
    SourceVolume {
        source: SourceId,
        volume: Volume,
        ramp: RampType,
        ramp_time_ms: u16,
    },
    SinkSoundProperty {
        sink: SinkId,
        property: SoundProperty,
    },
    SourceSoundProperty {
        source: SourceId,
        property: SoundProperty,
    },
    SinkNotification {
        sink: SinkId,
        configuration: NotificationConfiguration,
    },
    SourceNotification {
        source: SourceId,
        configuration: NotificationConfiguration,
    },
}

impl RoutingRequest {
    /// Handle kind a request of this shape is issued under.
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        match self {
            RoutingRequest::Connect { .. } => RequestKind::Connect,
            RoutingRequest::Disconnect(_) => RequestKind::Disconnect,
            RoutingRequest::SourceState { .. } => RequestKind::SetSourceState,
            RoutingRequest::SinkVolume { .. } => RequestKind::SetSinkVolume,
            RoutingRequest::SourceVolume { .. } => RequestKind::SetSourceVolume,
            RoutingRequest::SinkSoundProperty { .. } => RequestKind::SetSinkSoundProperty,
            RoutingRequest::SourceSoundProperty { .. } => RequestKind::SetSourceSoundProperty,
            RoutingRequest::SinkNotification { .. } => RequestKind::SetSinkNotification,
            RoutingRequest::SourceNotification { .. } => RequestKind::SetSourceNotification,
        }
    }
}

/// Hands out handle values and hop connection ids. Zero is never used.
#[derive(Debug, Default)]
struct Sequence {
    handle: u16,
    connection: ConnectionId,
}

impl Sequence {
    fn handle(&mut self, kind: RequestKind) -> Handle {
        self.handle = self.handle.wrapping_add(1).max(1);
        Handle::new(kind, self.handle)
    }

    fn connection(&mut self) -> ConnectionId {
        self.connection = self.connection.wrapping_add(1).max(1);
        self.connection
    }
}

/// Shared issue path of both engines: assigns the handle (and hop id for
/// connects) and passes the finished request to `sink`.
fn issue(
    sequence: &mut Sequence,
    request: impl FnOnce(ConnectionId) -> RoutingRequest,
    mut sink: impl FnMut(Handle, RoutingRequest),
) -> (Handle, ConnectionId) {
    let connection = sequence.connection();
    let request = request(connection);
    let handle = sequence.handle(request.kind());
    sink(handle, request);
    (handle, connection)
}

// ---------------------------------------------------------------------------
// RecordingRouting
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Recording {
    sequence: Sequence,
    requests: Vec<(Handle, RoutingRequest)>,
    aborted: Vec<Handle>,
    refuse: Option<ControlError>,
}

/// Engine that records requests and never acknowledges on its own. Clones
/// share the same recording.
#[derive(Debug, Clone, Default)]
pub struct RecordingRouting {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingRouting {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn requests(&self) -> Vec<(Handle, RoutingRequest)> {
        self.inner.lock().requests.clone()
    }

    /// Handles of every request issued so far, in issue order.
    #[must_use]
    pub fn issued(&self) -> Vec<Handle> {
        self.inner.lock().requests.iter().map(|(h, _)| *h).collect()
    }

    /// Handle of the most recent request.
    #[must_use]
    pub fn last(&self) -> Option<Handle> {
        self.inner.lock().requests.last().map(|(h, _)| *h)
    }

    /// The request issued under `handle`.
    #[must_use]
    pub fn request(&self, handle: Handle) -> Option<RoutingRequest> {
        self.inner
            .lock()
            .requests
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, r)| r.clone())
    }

    /// Handles passed to `abort`, in call order.
    #[must_use]
    pub fn aborted(&self) -> Vec<Handle> {
        self.inner.lock().aborted.clone()
    }

    /// Makes every following request fail with `error` until cleared.
    pub fn refuse(&self, error: Option<ControlError>) {
        self.inner.lock().refuse = error;
    }

    fn record(
        &mut self,
        request: impl FnOnce(ConnectionId) -> RoutingRequest,
    ) -> ControlResult<(Handle, ConnectionId)> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.refuse.clone() {
            return Err(error);
        }
        let Recording {
            sequence, requests, ..
        } = &mut *inner;
        Ok(issue(sequence, request, |handle, request| {
            requests.push((handle, request));
        }))
    }
}

// ---------------------------------------------------------------------------
// LoopbackRouting
// ---------------------------------------------------------------------------

/// Engine that accepts every request and queues a successful
/// acknowledgement on the controller's event channel.
#[derive(Debug)]
pub struct LoopbackRouting {
    events: mpsc::UnboundedSender<ControllerEvent>,
    sequence: Sequence,
}

impl LoopbackRouting {
    #[must_use]
    pub fn new(events: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        Self {
            events,
            sequence: Sequence::default(),
        }
    }

    fn record(
        &mut self,
        request: impl FnOnce(ConnectionId) -> RoutingRequest,
    ) -> ControlResult<(Handle, ConnectionId)> {
        let mut sent = Ok(());
        let events = &self.events;
        let issued = issue(&mut self.sequence, request, |handle, request| {
            debug!(%handle, ?request, "loopback acknowledges");
            sent = events
                .send(ControllerEvent::Ack {
                    handle,
                    result: Ok(()),
                })
                .map_err(|_| ControlError::Communication("event channel closed".into()));
        });
        sent.map(|()| issued)
    }
}

// ---------------------------------------------------------------------------
// RoutingControl
// ---------------------------------------------------------------------------

macro_rules! impl_routing_control {
    ($engine:ty) => {
        impl RoutingControl for $engine {
            fn connect(
                &mut self,
                source: SourceId,
                sink: SinkId,
                format: ConnectionFormat,
            ) -> ControlResult<(Handle, ConnectionId)> {
                self.record(|connection| RoutingRequest::Connect {
                    source,
                    sink,
                    format,
                    connection,
                })
            }

            fn disconnect(&mut self, connection: ConnectionId) -> ControlResult<Handle> {
                self.record(|_| RoutingRequest::Disconnect(connection))
                    .map(|(h, _)| h)
            }

            fn set_source_state(
                &mut self,
                source: SourceId,
                state: SourceState,
            ) -> ControlResult<Handle> {
                self.record(|_| RoutingRequest::SourceState { source, state })
                    .map(|(h, _)| h)
            }

            fn set_sink_volume(
                &mut self,
                sink: SinkId,
                volume: Volume,
                ramp: RampType,
                ramp_time_ms: u16,
            ) -> ControlResult<Handle> {
                self.record(|_| RoutingRequest::SinkVolume {
                    sink,
                    volume,
                    ramp,
                    ramp_time_ms,
                })
                .map(|(h, _)| h)
            }

            fn set_source_volume(
                &mut self,
                source: SourceId,
                volume: Volume,
                ramp: RampType,
                ramp_time_ms: u16,
            ) -> ControlResult<Handle> {
                self.record(|_| RoutingRequest::SourceVolume {
                    source,
                    volume,
                    ramp,
                    ramp_time_ms,
                })
                .map(|(h, _)| h)
            }

            fn set_sink_sound_property(
                &mut self,
                sink: SinkId,
                property: SoundProperty,
            ) -> ControlResult<Handle> {
                self.record(|_| RoutingRequest::SinkSoundProperty { sink, property })
                    .map(|(h, _)| h)
            }

            fn set_source_sound_property(
                &mut self,
                source: SourceId,
                property: SoundProperty,
            ) -> ControlResult<Handle> {
                self.record(|_| RoutingRequest::SourceSoundProperty { source, property })
                    .map(|(h, _)| h)
            }

            fn set_sink_notification_configuration(
                &mut self,
                sink: SinkId,
                configuration: NotificationConfiguration,
            ) -> ControlResult<Handle> {
                self.record(|_| RoutingRequest::SinkNotification {
                    sink,
                    configuration,
                })
                .map(|(h, _)| h)
            }

            fn set_source_notification_configuration(
                &mut self,
                source: SourceId,
                configuration: NotificationConfiguration,
            ) -> ControlResult<Handle> {
                self.record(|_| RoutingRequest::SourceNotification {
                    source,
                    configuration,
                })
                .map(|(h, _)| h)
            }

            fn abort(&mut self, handle: Handle) -> ControlResult<()> {
                self.drop_request(handle)
            }
        }
    };
}

impl_routing_control!(RecordingRouting);
impl_routing_control!(LoopbackRouting);

impl RecordingRouting {
    fn drop_request(&mut self, handle: Handle) -> ControlResult<()> {
        self.inner.lock().aborted.push(handle);
        Ok(())
    }
}

impl LoopbackRouting {
    #[allow(clippy::unused_self, clippy::unnecessary_wraps)]
    fn drop_request(&mut self, handle: Handle) -> ControlResult<()> {
        debug!(%handle, "loopback abort ignored");
        Ok(())
    }
}
