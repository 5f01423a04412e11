pub mod alert;
pub mod db;
pub mod matching;
pub mod monitor;
pub mod rules;
pub mod settings;
pub mod store;
pub mod surface;
pub mod utils;

pub use alert::{AlertChannel, AlertPresenter, PresentationError, PresentationReport};
pub use db::Database;
pub use matching::{find_matches, first_matching_rule, Match, ObservedItem};
pub use monitor::{
    spawn_wake_listener, AlarmDetails, BroadcastStatusSink, CycleReport, MonitorConfig,
    MonitorController, MonitorDeps, MonitorError, StatusSink, StatusSnapshot, StatusUpdate,
    TokioWakeTimer, WakeTimer,
};
pub use rules::{Rule, RuleError, RuleInput, RuleSet};
pub use settings::{AppSettings, SettingsStore};
pub use store::{DurableStore, MemoryStore};
pub use surface::{ObservationSurface, StaticDirectory, SurfaceDirectory, SurfaceEntry, SurfaceError};
pub use utils::{Clock, ManualClock, SystemClock};

#[cfg(feature = "desktop")]
pub(crate) use desktop::AppState;
#[cfg(feature = "desktop")]
pub use desktop::run;

#[cfg(feature = "desktop")]
mod desktop {
    use std::sync::Arc;

    use log::{debug, error, info, warn};
    use serde_json::Value;
    use tauri::{Emitter, Manager, RunEvent, State};
    use tokio::sync::broadcast::error::RecvError;

    use crate::alert::{
        desktop::{BadgeChannel, NotificationChannel, VisualChannel},
        sound::SoundChannel,
        AlertPresenter, SurfaceAlertChannel,
    };
    use crate::db::Database;
    use crate::monitor::{
        commands::{acknowledge_alarm, get_status, start_monitoring, stop_monitoring},
        spawn_wake_listener, BroadcastStatusSink, MonitorController, MonitorDeps, TokioWakeTimer,
    };
    use crate::rules::commands::{add_rule, remove_rule, set_rules};
    use crate::settings::{AppSettings, SettingsStore};
    use crate::surface::{
        webview::{SurfaceBridge, WebviewDirectory},
        SurfaceDirectory,
    };
    use crate::utils::{Clock, SystemClock};

    pub const STATUS_EVENT: &str = "status-update";

    pub(crate) struct AppState {
        pub(crate) monitor: MonitorController,
        pub(crate) settings: SettingsStore,
        pub(crate) bridge: Arc<SurfaceBridge>,
    }

    #[tauri::command]
    fn get_settings(state: State<AppState>) -> Result<AppSettings, String> {
        Ok(state.settings.get())
    }

    /// Saved immediately; the running monitor picks changes up on next launch.
    #[tauri::command]
    fn update_settings(
        settings: AppSettings,
        state: State<AppState>,
        app_handle: tauri::AppHandle,
    ) -> Result<AppSettings, String> {
        state
            .settings
            .update(settings.clone())
            .map_err(|e| e.to_string())?;

        app_handle
            .emit("settings-updated", &settings)
            .map_err(|e| e.to_string())?;

        Ok(settings)
    }

    /// Reply channel for scripts injected into observation surfaces.
    #[tauri::command]
    fn surface_report(request_id: String, ok: bool, payload: Value, state: State<AppState>) {
        if !state.bridge.resolve(&request_id, ok, payload) {
            debug!("Dropped late surface reply {request_id}");
        }
    }

    fn init_logging() {
        let debug_enabled = std::env::var("MAILWATCH_DEBUG").is_ok_and(|value| value == "1");
        let default_level = if debug_enabled {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };

        // RUST_LOG, when set, overrides the default level.
        env_logger::Builder::new()
            .filter_level(default_level)
            .parse_default_env()
            .init();
    }

    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        init_logging();
        info!("Mailwatch starting up...");

        let app = tauri::Builder::default()
            .plugin(tauri_plugin_opener::init())
            .plugin(tauri_plugin_notification::init())
            .setup(|app| {
                let result = (|| -> anyhow::Result<()> {
                    let app_data_dir = app
                        .path()
                        .app_data_dir()
                        .map_err(|err| anyhow::anyhow!(err))?;
                    std::fs::create_dir_all(&app_data_dir)?;

                    let database = Database::new(app_data_dir.join("mailwatch.sqlite3"))?;
                    let settings_store = SettingsStore::new(app_data_dir.join("settings.json"))?;
                    let settings = settings_store.get();

                    let handle = app.handle().clone();
                    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
                    let bridge = Arc::new(SurfaceBridge::new());
                    let surfaces: Arc<dyn SurfaceDirectory> = Arc::new(WebviewDirectory::new(
                        handle.clone(),
                        settings.surface_host.clone(),
                        Arc::clone(&bridge),
                    ));

                    let presenter = AlertPresenter::default()
                        .with_channel(Arc::new(SoundChannel::new(
                            settings.alarm_sound.enabled,
                            settings.alarm_sound.volume,
                        )))
                        .with_channel(Arc::new(VisualChannel::new(handle.clone())))
                        .with_channel(Arc::new(SurfaceAlertChannel::new(Arc::clone(&surfaces))))
                        .with_channel(Arc::new(BadgeChannel::new(
                            handle.clone(),
                            settings.badge_clear_after(),
                        )))
                        .with_channel(Arc::new(NotificationChannel::new(
                            handle.clone(),
                            settings.notifications_enabled,
                        )));

                    let status = BroadcastStatusSink::new(32);
                    let mut updates = status.subscribe();
                    let emitter = handle.clone();
                    tauri::async_runtime::spawn(async move {
                        loop {
                            match updates.recv().await {
                                Ok(update) => {
                                    if let Err(err) = emitter.emit(STATUS_EVENT, &update) {
                                        warn!("Failed to emit status update: {err}");
                                    }
                                }
                                Err(RecvError::Lagged(skipped)) => {
                                    debug!("Status forwarder skipped {skipped} stale updates");
                                }
                                Err(RecvError::Closed) => break,
                            }
                        }
                    });

                    let (wake_timer, fires) = TokioWakeTimer::new(Arc::clone(&clock));
                    let controller = MonitorController::new(
                        MonitorDeps {
                            store: Arc::new(database),
                            surfaces,
                            presenter,
                            status: Arc::new(status),
                            wake_timer: Arc::new(wake_timer),
                            clock,
                        },
                        settings.monitor_config(),
                    );

                    let background = controller.clone();
                    tauri::async_runtime::spawn(async move {
                        spawn_wake_listener(background.clone(), fires);
                        if let Err(err) = background.init().await {
                            error!("Failed to restore monitor state: {err}");
                        }
                    });

                    app.manage(AppState {
                        monitor: controller,
                        settings: settings_store,
                        bridge,
                    });

                    Ok(())
                })();

                result.map_err(|err| err.into())
            })
            .invoke_handler(tauri::generate_handler![
                get_status,
                set_rules,
                add_rule,
                remove_rule,
                start_monitoring,
                stop_monitoring,
                acknowledge_alarm,
                get_settings,
                update_settings,
                surface_report,
            ])
            .build(tauri::generate_context!())
            .expect("error while building tauri application");

        app.run(|app_handle, event| {
            if let RunEvent::Exit = event {
                let monitor = app_handle.state::<AppState>().monitor.clone();
                tauri::async_runtime::block_on(monitor.teardown());
            }
        });
    }
}
