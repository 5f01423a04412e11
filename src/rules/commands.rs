use serde_json::Value;
use tauri::State;

use crate::monitor::StatusSnapshot;
use crate::rules::RuleInput;
use crate::AppState;

/// Replaces the whole rule list. Anything that is not a list clears it.
#[tauri::command]
pub async fn set_rules(state: State<'_, AppState>, rules: Value) -> Result<StatusSnapshot, String> {
    state
        .monitor
        .set_rules_value(rules)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn add_rule(
    state: State<'_, AppState>,
    rule: RuleInput,
) -> Result<StatusSnapshot, String> {
    state.monitor.add_rule(rule).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn remove_rule(state: State<'_, AppState>, index: usize) -> Result<StatusSnapshot, String> {
    state
        .monitor
        .remove_rule(index)
        .await
        .map_err(|e| e.to_string())
}
