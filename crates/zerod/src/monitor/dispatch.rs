//! Event dispatch: pre-dispatch guard, global handlers and the station
//! handler table.

use tracing::{debug, info, trace, warn};
use zero_core::{
    AppState, EventTier, StationConfig, StationDocument, StationState, ZeroEvent, ZeroEventKind,
};

use crate::app::Application;
use crate::notify::ZeroNotification;

type StationHandler = fn(&Application, &str, Option<&str>);

/// Handler for a station-scoped kind.
fn station_handler(kind: ZeroEventKind) -> Option<StationHandler> {
    let handler: StationHandler = match kind {
        ZeroEventKind::CenterStationState => station_state,
        ZeroEventKind::CenterStationInstall => station_install,
        ZeroEventKind::CenterStationUpdate => station_update,
        ZeroEventKind::CenterStationJoin => station_join,
        ZeroEventKind::CenterStationPause => station_pause,
        ZeroEventKind::CenterStationResume => station_resume,
        ZeroEventKind::CenterStationClosing => station_closing,
        ZeroEventKind::CenterStationLeft => station_left,
        ZeroEventKind::CenterStationStop => station_stop,
        ZeroEventKind::CenterStationRemove => station_uninstall,
        ZeroEventKind::CenterStationDocument => station_document,
        ZeroEventKind::CenterClientJoin => client_join,
        ZeroEventKind::CenterClientLeft => client_left,
        ZeroEventKind::CenterSystemStart
        | ZeroEventKind::CenterSystemClosing
        | ZeroEventKind::CenterSystemStop
        | ZeroEventKind::CenterWorkerSoundOff => return None,
    };
    Some(handler)
}

/// Routes one decoded event.
///
/// While the coordinator link or the process is `Failed`, every event is
/// turned into a rejoin attempt instead. Station events are dropped unless
/// the process is in run.
pub async fn dispatch(app: &Application, event: ZeroEvent) {
    if app.center_status() == StationState::Failed || app.app_state() == AppState::Failed {
        debug!(kind = %event.kind, "Link failed, rejoining instead of dispatching");
        app.rejoin().await;
        return;
    }

    match event.kind.tier() {
        EventTier::Global => match event.kind {
            ZeroEventKind::CenterSystemStart => center_start(app, event.content()).await,
            ZeroEventKind::CenterSystemClosing => center_closing(app, event.content()),
            ZeroEventKind::CenterSystemStop => center_stop(app, event.content()),
            ZeroEventKind::CenterWorkerSoundOff => worker_sound_off(app),
            other => warn!(kind = %other, "No global handler"),
        },
        EventTier::Station => {
            if !app.in_run() {
                trace!(kind = %event.kind, "Dropped station event, not in run");
                return;
            }
            let Some(station) = event.station_name().filter(|s| !s.is_empty()) else {
                debug!(kind = %event.kind, "Dropped station event without a station");
                return;
            };
            if let Some(handler) = station_handler(event.kind) {
                handler(app, station, event.content());
            }
        }
    }
}

// ============================================================================
// Global handlers
// ============================================================================

async fn center_start(app: &Application, content: Option<&str>) {
    if app
        .app_state_cell()
        .compare_exchange(AppState::Failed, AppState::Initialized)
        .is_ok()
    {
        info!(content = content.unwrap_or_default(), "Coordinator started");
        app.rejoin().await;
    }
}

fn center_closing(app: &Application, content: Option<&str>) {
    if app
        .app_state_cell()
        .compare_exchange(AppState::Run, AppState::Closing)
        .is_ok()
    {
        info!(content = content.unwrap_or_default(), "Coordinator closing");
        app.notifier().publish(ZeroNotification::SystemEvent {
            kind: ZeroEventKind::CenterSystemClosing,
        });
        app.center_status_cell().store(StationState::Closed);
        app.notifier().publish(ZeroNotification::ZeroEnd);
        app.app_state_cell().store(AppState::Failed);
    }
}

fn center_stop(app: &Application, content: Option<&str>) {
    if app.center_status_cell().swap(StationState::Destroy) != StationState::Destroy {
        info!(content = content.unwrap_or_default(), "Coordinator stopped");
    }
}

fn worker_sound_off(app: &Application) {
    if app.can_do() {
        app.notifier().publish(ZeroNotification::Heartbeat);
    }
}

// ============================================================================
// Station handlers
// ============================================================================

/// Raises the state-changed and kind-specific notifications.
fn announce(app: &Application, kind: ZeroEventKind, config: &StationConfig, content: Option<&str>) {
    app.notifier().station_state_changed(config);
    app.notifier()
        .station_event(kind, &config.name, content.map(str::to_string), Some(config));
}

/// Upserts from the event payload with `adjust`, then announces.
fn upsert_and_announce<F>(
    app: &Application,
    kind: ZeroEventKind,
    name: &str,
    content: Option<&str>,
    adjust: F,
) where
    F: FnOnce(Option<&StationConfig>, &mut StationConfig),
{
    let json = content.unwrap_or_default();
    match app
        .registry()
        .upsert_from_document_with(name, json, adjust)
    {
        Ok(config) => {
            info!(station = %name, kind = %kind, state = %config.state, "Station updated");
            announce(app, kind, &config, content);
        }
        Err(e) => warn!(station = %name, kind = %kind, error = %e, "Station event ignored"),
    }
}

/// Applies a state change to an existing station, then announces.
fn transition(
    app: &Application,
    kind: ZeroEventKind,
    name: &str,
    next: impl FnOnce(StationState) -> StationState,
) {
    let Some(config) = app.registry().set_state(name, next) else {
        debug!(station = %name, kind = %kind, "Unknown station");
        return;
    };
    info!(station = %name, kind = %kind, state = %config.state, "Station state changed");
    announce(app, kind, &config, None);
}

fn station_install(app: &Application, name: &str, content: Option<&str>) {
    upsert_and_announce(
        app,
        ZeroEventKind::CenterStationInstall,
        name,
        content,
        |_, config| config.state = StationState::None,
    );
}

fn station_update(app: &Application, name: &str, content: Option<&str>) {
    upsert_and_announce(
        app,
        ZeroEventKind::CenterStationUpdate,
        name,
        content,
        |previous, config| {
            if let Some(previous) = previous {
                config.state = previous.state;
            }
        },
    );
}

fn station_join(app: &Application, name: &str, content: Option<&str>) {
    upsert_and_announce(
        app,
        ZeroEventKind::CenterStationJoin,
        name,
        content,
        |_, config| config.state = StationState::Run,
    );
}

fn station_pause(app: &Application, name: &str, _: Option<&str>) {
    transition(app, ZeroEventKind::CenterStationPause, name, |_| {
        StationState::Pause
    });
}

fn station_resume(app: &Application, name: &str, _: Option<&str>) {
    transition(app, ZeroEventKind::CenterStationResume, name, |_| {
        StationState::Run
    });
}

fn station_closing(app: &Application, name: &str, _: Option<&str>) {
    transition(app, ZeroEventKind::CenterStationClosing, name, |s| {
        s.advance_to(StationState::Closing)
    });
}

fn station_left(app: &Application, name: &str, _: Option<&str>) {
    transition(app, ZeroEventKind::CenterStationLeft, name, |s| {
        s.advance_to(StationState::Closed)
    });
}

fn station_stop(app: &Application, name: &str, _: Option<&str>) {
    transition(app, ZeroEventKind::CenterStationStop, name, |s| {
        s.advance_to(StationState::Stop)
    });
}

fn station_uninstall(app: &Application, name: &str, _: Option<&str>) {
    let Some(config) = app.registry().remove(name) else {
        debug!(station = %name, "Unknown station");
        return;
    };
    info!(station = %name, "Station uninstalled");
    app.notifier().station_state_changed(&config);
    app.notifier().station_event(
        ZeroEventKind::CenterStationRemove,
        &config.name,
        None,
        Some(&config),
    );
}

/// Heartbeat: forwarded without touching stored state.
fn station_state(app: &Application, name: &str, content: Option<&str>) {
    let Some(config) = app.registry().get(name) else {
        return;
    };
    app.notifier().station_event(
        ZeroEventKind::CenterStationState,
        name,
        content.map(str::to_string),
        Some(&config),
    );
}

fn station_document(app: &Application, name: &str, content: Option<&str>) {
    let document = match StationDocument::from_remote_json(name, content.unwrap_or_default()) {
        Ok(document) => document,
        Err(e) => {
            warn!(station = %name, error = %e, "Station document ignored");
            return;
        }
    };
    app.registry().attach_document(name, document);

    if let Some(config) = app.registry().get(name) {
        app.notifier().station_event(
            ZeroEventKind::CenterStationDocument,
            name,
            Some(name.to_string()),
            Some(&config),
        );
    }
}

fn client_join(app: &Application, name: &str, _: Option<&str>) {
    client_event(app, ZeroEventKind::CenterClientJoin, name);
}

fn client_left(app: &Application, name: &str, _: Option<&str>) {
    client_event(app, ZeroEventKind::CenterClientLeft, name);
}

fn client_event(app: &Application, kind: ZeroEventKind, name: &str) {
    if let Some(config) = app.registry().get(name) {
        app.notifier()
            .station_event(kind, name, Some(name.to_string()), Some(&config));
    }
}
