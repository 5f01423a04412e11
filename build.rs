// Commands exposed over IPC. Listing them here makes each one opt-in per
// capability through a generated `allow-<command>` permission.
#[cfg(feature = "desktop")]
const APP_COMMANDS: &[&str] = &[
    "get_status",
    "set_rules",
    "add_rule",
    "remove_rule",
    "start_monitoring",
    "stop_monitoring",
    "acknowledge_alarm",
    "get_settings",
    "update_settings",
    "surface_report",
];

fn main() {
    // Only the desktop shell needs the generated Tauri context; the monitoring
    // core builds and tests without a webview toolchain.
    #[cfg(feature = "desktop")]
    {
        tauri_build::try_build(
            tauri_build::Attributes::new()
                .app_manifest(tauri_build::AppManifest::new().commands(APP_COMMANDS)),
        )
        .expect("failed to run tauri build");
    }
}
