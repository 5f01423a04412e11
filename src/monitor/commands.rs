use tauri::State;

use crate::monitor::{MonitorController, StatusSnapshot};
use crate::AppState;

fn controller_from_state(state: &State<'_, AppState>) -> MonitorController {
    state.monitor.clone()
}

#[tauri::command]
pub async fn get_status(state: State<'_, AppState>) -> Result<StatusSnapshot, String> {
    let controller = controller_from_state(&state);
    Ok(controller.get_status().await)
}

#[tauri::command]
pub async fn start_monitoring(state: State<'_, AppState>) -> Result<StatusSnapshot, String> {
    let controller = controller_from_state(&state);
    controller.start().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn stop_monitoring(state: State<'_, AppState>) -> Result<StatusSnapshot, String> {
    let controller = controller_from_state(&state);
    controller.stop().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn acknowledge_alarm(state: State<'_, AppState>) -> Result<StatusSnapshot, String> {
    let controller = controller_from_state(&state);
    controller
        .acknowledge_alarm()
        .await
        .map_err(|e| e.to_string())
}
