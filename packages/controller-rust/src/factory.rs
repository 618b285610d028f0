//! Builds action trees from policy descriptors.
//!
//! Parameter problems never escape as errors: an action that cannot be built
//! becomes a [`Reject`] leaf that fails with the binding error when the job
//! reaches it.

use routing_core::descriptor::param;
use routing_core::types::{NotificationConfiguration, SoundProperty, SystemProperty};
use routing_core::{ActionDescriptor, ActionType, ConnectionOrder, ControlError, ControlResult};
use tracing::debug;

use crate::action::connection::{ConnectPlan, DisconnectPlan, ResumePlan, SuspendPlan};
use crate::action::params::Params;
use crate::action::property::{NotificationStep, SoundPropertyStep, SystemPropertyStep};
use crate::action::reject::Reject;
use crate::action::volume::{
    set_volume, RestoreVolumePlan, SinkSelection, SinkVolumePlan, VolumeChange,
};
use crate::action::{Action, ActionId, ActionIds, LeafAction, PlannedAction};
use crate::config::ControllerConfig;
use crate::elements::Endpoint;
use crate::policy::ConnectionFilter;

/// Builds the action for `descriptor` and applies its `rollback` flag.
#[must_use]
pub fn build(
    descriptor: &ActionDescriptor,
    config: &ControllerConfig,
    ids: &mut ActionIds,
) -> Box<dyn Action> {
    let params = Params::new(descriptor, config);
    let built = params
        .rollback()
        .and_then(|rollback| Ok((rollback, construct(descriptor.action, &params, ids)?)));
    match built {
        Ok((rollback, mut action)) => {
            action.set_undo_required(rollback);
            action
        }
        Err(err) => {
            debug!(action = %descriptor.action, %err, "descriptor rejected");
            Box::new(LeafAction::new(ids.next(), Reject::new(descriptor.action, err), 0))
        }
    }
}

fn construct(
    action: ActionType,
    params: &Params<'_>,
    ids: &mut ActionIds,
) -> ControlResult<Box<dyn Action>> {
    let timeout_ms = params.timeout_ms()?;
    let id = ids.next();
    Ok(match action {
        ActionType::Connect => Box::new(PlannedAction::new(
            id,
            ConnectPlan::new(
                params.required_text(param::CLASS_NAME)?,
                params.required_text(param::SOURCE_NAME)?,
                params.required_text(param::SINK_NAME)?,
                params.connection_format()?,
                timeout_ms,
            ),
        )),
        ActionType::Disconnect => Box::new(PlannedAction::new(
            id,
            DisconnectPlan::new(ConnectionFilter::from_params(params)?, order(params)?, timeout_ms),
        )),
        ActionType::Suspend => Box::new(PlannedAction::new(
            id,
            SuspendPlan::new(ConnectionFilter::from_params(params)?, order(params)?, timeout_ms),
        )),
        ActionType::Resume => Box::new(PlannedAction::new(
            id,
            ResumePlan::new(ConnectionFilter::from_params(params)?, order(params)?, timeout_ms),
        )),
        ActionType::SetVolume => set_volume(
            id,
            &endpoint(params)?,
            params.volume(param::VOLUME)?,
            params.parse(param::MAIN_VOLUME)?,
            params.ramp()?,
            timeout_ms,
        ),
        ActionType::Limit => {
            let change = VolumeChange::Limit {
                id: limit_id(params)?,
                level: params.volume(param::VOLUME)?,
            };
            sink_volume_plan(id, "Limit", params, change, timeout_ms)?
        }
        ActionType::Unlimit => {
            let change = VolumeChange::Unlimit {
                id: limit_id(params)?,
            };
            sink_volume_plan(id, "Unlimit", params, change, timeout_ms)?
        }
        ActionType::Mute => sink_volume_plan(id, "Mute", params, VolumeChange::Mute, timeout_ms)?,
        ActionType::Unmute => {
            sink_volume_plan(id, "Unmute", params, VolumeChange::Unmute, timeout_ms)?
        }
        ActionType::SetProperty => Box::new(LeafAction::new(
            id,
            SoundPropertyStep::new(
                endpoint(params)?,
                SoundProperty {
                    kind: params.required(param::PROPERTY_TYPE)?,
                    value: params.required(param::PROPERTY_VALUE)?,
                },
            ),
            timeout_ms,
        )),
        ActionType::SetNotificationConfiguration => Box::new(LeafAction::new(
            id,
            NotificationStep::new(
                endpoint(params)?,
                NotificationConfiguration {
                    kind: params.required(param::NOTIFICATION_TYPE)?,
                    status: params.required(param::NOTIFICATION_STATUS)?,
                    parameter: params.parse_or(param::NOTIFICATION_PARAMETER, 0)?,
                },
            ),
            timeout_ms,
        )),
        ActionType::SetSystemProperty => Box::new(LeafAction::new(
            id,
            SystemPropertyStep::new(SystemProperty {
                kind: params.required(param::PROPERTY_TYPE)?,
                value: params.required(param::PROPERTY_VALUE)?,
            }),
            timeout_ms,
        )),
        ActionType::RestoreVolume => Box::new(PlannedAction::new(
            id,
            RestoreVolumePlan {
                class_name: params.required_text(param::CLASS_NAME)?.to_string(),
                ramp: params.ramp()?,
                timeout_ms,
            },
        )),
    })
}

fn order(params: &Params<'_>) -> ControlResult<ConnectionOrder> {
    params.parse_or(param::ORDER, ConnectionOrder::default())
}

/// `sinkName` takes precedence over `sourceName`.
fn endpoint(params: &Params<'_>) -> ControlResult<Endpoint> {
    if let Some(sink) = params.text(param::SINK_NAME) {
        return Ok(Endpoint::Sink(sink.to_string()));
    }
    if let Some(source) = params.text(param::SOURCE_NAME) {
        return Ok(Endpoint::Source(source.to_string()));
    }
    Err(ControlError::Parameter(format!(
        "one of {} or {} must be bound",
        param::SINK_NAME,
        param::SOURCE_NAME
    )))
}

fn limit_id(params: &Params<'_>) -> ControlResult<String> {
    params
        .text(param::LIMIT_ID)
        .or_else(|| params.text(param::CLASS_NAME))
        .map(str::to_string)
        .ok_or_else(|| {
            ControlError::Parameter(format!(
                "one of {} or {} must be bound",
                param::LIMIT_ID,
                param::CLASS_NAME
            ))
        })
}

fn sink_volume_plan(
    id: ActionId,
    name: &'static str,
    params: &Params<'_>,
    change: VolumeChange,
    timeout_ms: u64,
) -> ControlResult<Box<dyn Action>> {
    let selection = if let Some(sink) = params.text(param::SINK_NAME) {
        SinkSelection::Sink(sink.to_string())
    } else if let Some(class_name) = params.text(param::CLASS_NAME) {
        SinkSelection::Class(class_name.to_string())
    } else {
        return Err(ControlError::Parameter(format!(
            "one of {} or {} must be bound",
            param::SINK_NAME,
            param::CLASS_NAME
        )));
    };
    Ok(Box::new(PlannedAction::new(
        id,
        SinkVolumePlan {
            name,
            selection,
            change,
            ramp: params.ramp()?,
            timeout_ms,
        },
    )))
}
