//! Sound property, notification configuration and system property actions.

use routing_core::types::{NotificationConfiguration, SoundProperty, SystemProperty};
use routing_core::{ControlError, ControlResult};
use tracing::debug;

use super::leaf::{LeafStep, Step};
use super::ActionContext;
use crate::elements::Endpoint;

fn tolerate_no_change(result: ControlResult<()>) -> ControlResult<()> {
    match result {
        Err(ControlError::NoChange) => Ok(()),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Sound property
// ---------------------------------------------------------------------------

/// Sets one sound property on a sink or source and mirrors it into the main
/// sound properties.
pub struct SoundPropertyStep {
    endpoint: Endpoint,
    property: SoundProperty,
    previous: Option<i16>,
    /// Value an outstanding request is moving to.
    target: i16,
}

impl SoundPropertyStep {
    #[must_use]
    pub fn new(endpoint: Endpoint, property: SoundProperty) -> Self {
        Self {
            endpoint,
            property,
            previous: None,
            target: property.value,
        }
    }

    fn current(&self, ctx: &ActionContext<'_>) -> ControlResult<Option<i16>> {
        let kind = self.property.kind;
        Ok(match &self.endpoint {
            Endpoint::Sink(name) => ctx.elements.sink(name)?.sound_properties.get(&kind).copied(),
            Endpoint::Source(name) => ctx
                .elements
                .source(name)?
                .sound_properties
                .get(&kind)
                .copied(),
        })
    }

    fn request(&mut self, ctx: &mut ActionContext<'_>, value: i16) -> ControlResult<Step> {
        let property = SoundProperty {
            kind: self.property.kind,
            value,
        };
        self.target = value;
        if self.current(ctx)? == Some(value) {
            return Ok(Step::Complete);
        }
        let handle = match &self.endpoint {
            Endpoint::Sink(name) => {
                let id = ctx.elements.sink(name)?.id;
                ctx.routing.set_sink_sound_property(id, property)?
            }
            Endpoint::Source(name) => {
                let id = ctx.elements.source(name)?.id;
                ctx.routing.set_source_sound_property(id, property)?
            }
        };
        Ok(Step::Pending(handle))
    }

    fn commit(&self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        let property = SoundProperty {
            kind: self.property.kind,
            value: self.target,
        };
        debug!(endpoint = %self.endpoint, kind = property.kind, value = property.value, "sound property committed");
        match &self.endpoint {
            Endpoint::Sink(name) => {
                let sink = ctx.elements.sink_mut(name)?;
                sink.sound_properties.insert(property.kind, property.value);
                sink.main_sound_properties.insert(property.kind, property.value);
                let id = sink.id;
                tolerate_no_change(
                    ctx.elements
                        .database_mut()
                        .change_sink_main_sound_property(id, property),
                )
            }
            Endpoint::Source(name) => {
                let source = ctx.elements.source_mut(name)?;
                source.sound_properties.insert(property.kind, property.value);
                source
                    .main_sound_properties
                    .insert(property.kind, property.value);
                let id = source.id;
                tolerate_no_change(
                    ctx.elements
                        .database_mut()
                        .change_source_main_sound_property(id, property),
                )
            }
        }
    }
}

impl LeafStep for SoundPropertyStep {
    fn name(&self) -> &'static str {
        match self.endpoint {
            Endpoint::Sink(_) => "SetSinkSoundProperty",
            Endpoint::Source(_) => "SetSourceSoundProperty",
        }
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        self.previous = self.current(ctx)?;
        let step = self.request(ctx, self.property.value)?;
        if step == Step::Complete {
            self.commit(ctx)?;
        }
        Ok(step)
    }

    fn confirm(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        self.commit(ctx)
    }

    fn start_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        // A property the endpoint never had cannot be taken back.
        let Some(previous) = self.previous else {
            return Ok(Step::Complete);
        };
        let step = self.request(ctx, previous)?;
        if step == Step::Complete {
            self.commit(ctx)?;
        }
        Ok(step)
    }

    fn confirm_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        self.commit(ctx)
    }
}

// ---------------------------------------------------------------------------
// Notification configuration
// ---------------------------------------------------------------------------

/// Applies a notification configuration to a sink or source.
pub struct NotificationStep {
    endpoint: Endpoint,
    configuration: NotificationConfiguration,
    previous: Option<NotificationConfiguration>,
}

impl NotificationStep {
    #[must_use]
    pub fn new(endpoint: Endpoint, configuration: NotificationConfiguration) -> Self {
        Self {
            endpoint,
            configuration,
            previous: None,
        }
    }

    fn notifications<'c>(
        &self,
        ctx: &'c mut ActionContext<'_>,
    ) -> ControlResult<&'c mut std::collections::BTreeMap<u16, NotificationConfiguration>> {
        Ok(match &self.endpoint {
            Endpoint::Sink(name) => &mut ctx.elements.sink_mut(name)?.notifications,
            Endpoint::Source(name) => &mut ctx.elements.source_mut(name)?.notifications,
        })
    }

    fn request(
        &self,
        ctx: &mut ActionContext<'_>,
        configuration: NotificationConfiguration,
    ) -> ControlResult<Step> {
        let handle = match &self.endpoint {
            Endpoint::Sink(name) => {
                let id = ctx.elements.sink(name)?.id;
                ctx.routing
                    .set_sink_notification_configuration(id, configuration)?
            }
            Endpoint::Source(name) => {
                let id = ctx.elements.source(name)?.id;
                ctx.routing
                    .set_source_notification_configuration(id, configuration)?
            }
        };
        Ok(Step::Pending(handle))
    }
}

impl LeafStep for NotificationStep {
    fn name(&self) -> &'static str {
        "SetNotificationConfiguration"
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        let kind = self.configuration.kind;
        self.previous = self.notifications(ctx)?.get(&kind).copied();
        if self.previous == Some(self.configuration) {
            return Ok(Step::Complete);
        }
        self.request(ctx, self.configuration)
    }

    fn confirm(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        let configuration = self.configuration;
        self.notifications(ctx)?
            .insert(configuration.kind, configuration);
        Ok(())
    }

    fn start_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        match self.previous {
            Some(previous) if previous == self.configuration => Ok(Step::Complete),
            Some(previous) => self.request(ctx, previous),
            None => {
                let kind = self.configuration.kind;
                self.notifications(ctx)?.remove(&kind);
                Ok(Step::Complete)
            }
        }
    }

    fn confirm_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        if let Some(previous) = self.previous {
            self.notifications(ctx)?.insert(previous.kind, previous);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// System property
// ---------------------------------------------------------------------------

/// Stores a system property. Synchronous: there is no engine request.
pub struct SystemPropertyStep {
    property: SystemProperty,
    previous: Option<i16>,
}

impl SystemPropertyStep {
    #[must_use]
    pub fn new(property: SystemProperty) -> Self {
        Self {
            property,
            previous: None,
        }
    }
}

impl LeafStep for SystemPropertyStep {
    fn name(&self) -> &'static str {
        "SetSystemProperty"
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        self.previous = ctx.elements.set_system_property(self.property)?;
        Ok(Step::Complete)
    }

    fn start_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        match self.previous {
            Some(value) => {
                ctx.elements.set_system_property(SystemProperty {
                    kind: self.property.kind,
                    value,
                })?;
            }
            None => ctx.elements.clear_system_property(self.property.kind),
        }
        Ok(Step::Complete)
    }
}

#[cfg(test)]
mod tests {
    use routing_core::types::NotificationStatus;
    use routing_core::RequestKind;

    use super::*;
    use crate::action::{Action, ActionStatus, LeafAction, Outcome};
    use crate::testing::TestBed;

    const TREBLE: u16 = 3;

    #[test]
    fn sink_property_commits_on_ack_and_reaches_database() {
        let mut bed = TestBed::new();
        let mut action = LeafAction::new(
            bed.ids.next(),
            SoundPropertyStep::new(
                Endpoint::Sink("AMP".into()),
                SoundProperty {
                    kind: TREBLE,
                    value: 4,
                },
            ),
            500,
        );
        assert_eq!(bed.run(|ctx| action.execute(ctx)), Outcome::Waiting);
        assert_eq!(
            bed.routing.last().unwrap().kind,
            RequestKind::SetSinkSoundProperty
        );
        assert!(bed.elements.sink("AMP").unwrap().sound_properties.is_empty());

        assert_eq!(bed.settle(&mut action), Outcome::Done);
        let sink = bed.elements.sink("AMP").unwrap();
        assert_eq!(sink.sound_properties.get(&TREBLE), Some(&4));
        assert_eq!(sink.main_sound_properties.get(&TREBLE), Some(&4));
    }

    #[test]
    fn unchanged_property_is_synchronous() {
        let mut bed = TestBed::new();
        bed.elements
            .source_mut("MediaPlayer")
            .unwrap()
            .sound_properties
            .insert(TREBLE, 2);
        let mut action = LeafAction::new(
            bed.ids.next(),
            SoundPropertyStep::new(
                Endpoint::Source("MediaPlayer".into()),
                SoundProperty {
                    kind: TREBLE,
                    value: 2,
                },
            ),
            500,
        );
        assert_eq!(bed.run(|ctx| action.execute(ctx)), Outcome::Done);
        assert!(bed.routing.issued().is_empty());
    }

    #[test]
    fn property_undo_restores_previous_value() {
        let mut bed = TestBed::new();
        bed.elements
            .sink_mut("AMP")
            .unwrap()
            .sound_properties
            .insert(TREBLE, 1);
        let mut action = LeafAction::new(
            bed.ids.next(),
            SoundPropertyStep::new(
                Endpoint::Sink("AMP".into()),
                SoundProperty {
                    kind: TREBLE,
                    value: 7,
                },
            ),
            500,
        );
        bed.run(|ctx| action.execute(ctx));
        bed.settle(&mut action);
        bed.run(|ctx| action.undo(ctx));
        assert_eq!(bed.settle(&mut action), Outcome::Done);
        assert_eq!(action.status(), ActionStatus::UndoComplete);
        assert_eq!(
            bed.elements.sink("AMP").unwrap().sound_properties.get(&TREBLE),
            Some(&1)
        );
    }

    #[test]
    fn notification_undo_removes_new_configuration() {
        let mut bed = TestBed::new();
        let configuration = NotificationConfiguration {
            kind: 1,
            status: NotificationStatus::Periodic,
            parameter: 0,
        };
        let mut action = LeafAction::new(
            bed.ids.next(),
            NotificationStep::new(Endpoint::Sink("PhoneSpeaker".into()), configuration),
            500,
        );
        bed.run(|ctx| action.execute(ctx));
        assert_eq!(bed.settle(&mut action), Outcome::Done);
        assert_eq!(
            bed.elements.sink("PhoneSpeaker").unwrap().notifications.get(&1),
            Some(&configuration)
        );

        assert_eq!(bed.run(|ctx| action.undo(ctx)), Outcome::Done);
        assert!(bed
            .elements
            .sink("PhoneSpeaker")
            .unwrap()
            .notifications
            .is_empty());
    }

    #[test]
    fn system_property_undo_clears_unset_value() {
        let mut bed = TestBed::new();
        let property = SystemProperty { kind: 9, value: 1 };
        let mut action =
            LeafAction::new(bed.ids.next(), SystemPropertyStep::new(property), 500);
        assert_eq!(bed.run(|ctx| action.execute(ctx)), Outcome::Done);
        assert_eq!(bed.elements.system_property(9), Some(1));
        assert_eq!(bed.run(|ctx| action.undo(ctx)), Outcome::Done);
        assert_eq!(bed.elements.system_property(9), None);
    }
}
