use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use tauri::{AppHandle, Manager, Runtime, WebviewWindow};
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{ObservationSurface, RefreshOutcome, SurfaceDirectory, SurfaceEntry, SurfaceError};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = false;

use crate::{log_debug, log_error, log_warn};

/// Upper bound for a single script round trip. `wait_for_change` is exempt;
/// the agent bounds that one with the settle timeout.
const SCRIPT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

const UNREAD_ROWS: &str = ".zA.zE:not(.zz)";
const SENDER_WITH_EMAIL: &str = ".yX.xY span[email]";
const SENDER_TEXT: &str = ".yX.xY span";
const SUBJECT_TEXT: &str = ".y6 span";
const ROW_KEY_ATTR: &str = "data-mailwatch-key";
const BANNER_ID: &str = "mailwatch-alert-banner";

type Reply = Result<Value, String>;

/// Routes replies from injected scripts back to the awaiting Rust call.
///
/// Scripts cannot return values through `eval`, so each one is tagged with a
/// request id and answers through the `surface_report` command.
#[derive(Default)]
pub struct SurfaceBridge {
    pending: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
}

impl SurfaceBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<Reply>>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn register(&self) -> (PendingReply<'_>, oneshot::Receiver<Reply>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending().insert(id.clone(), tx);
        (PendingReply { bridge: self, id }, rx)
    }

    /// Delivers a reply. Returns false for unknown or expired request ids.
    pub fn resolve(&self, request_id: &str, ok: bool, payload: Value) -> bool {
        let Some(tx) = self.pending().remove(request_id) else {
            return false;
        };
        let reply = if ok {
            Ok(payload)
        } else {
            Err(payload
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| payload.to_string()))
        };
        tx.send(reply).is_ok()
    }
}

/// Removes the pending entry when the awaiting call goes away, including on
/// timeout or cancellation.
struct PendingReply<'a> {
    bridge: &'a SurfaceBridge,
    id: String,
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        self.bridge.pending().remove(&self.id);
    }
}

/// An inbox page loaded in a webview window.
pub struct WebviewSurface<R: Runtime> {
    label: String,
    window: WebviewWindow<R>,
    bridge: Arc<SurfaceBridge>,
}

impl<R: Runtime> WebviewSurface<R> {
    pub fn new(window: WebviewWindow<R>, bridge: Arc<SurfaceBridge>) -> Self {
        Self {
            label: window.label().to_string(),
            window,
            bridge,
        }
    }

    fn wrap(request_id: &str, body: &str) -> String {
        format!(
            r#"(function() {{
  const reply = (ok, payload) => window.__TAURI_INTERNALS__.invoke('surface_report', {{ requestId: '{request_id}', ok, payload }});
  try {{
{body}
  }} catch (e) {{
    reply(false, String(e));
  }}
}})();"#
        )
    }

    async fn run(&self, body: &str, timeout: Option<Duration>) -> Result<Value, SurfaceError> {
        let (pending, rx) = self.bridge.register();
        let script = Self::wrap(&pending.id, body);

        self.window
            .eval(&script)
            .map_err(|err| {
                log_error!("Script injection failed on {}: {err}", self.label);
                SurfaceError::Unreachable {
                    surface: self.label.clone(),
                    reason: err.to_string(),
                }
            })?;

        let reply = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx).await.map_err(|_| {
                SurfaceError::Timeout {
                    surface: self.label.clone(),
                    waited_ms: limit.as_millis() as u64,
                }
            })?,
            None => rx.await,
        };
        drop(pending);

        match reply {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(reason)) => Err(SurfaceError::Script {
                surface: self.label.clone(),
                reason,
            }),
            Err(_) => Err(SurfaceError::Unreachable {
                surface: self.label.clone(),
                reason: "reply channel closed".into(),
            }),
        }
    }
}

fn refresh_script() -> String {
    r#"    const button = document.querySelector('div[act="20"]') || document.querySelector('[aria-label="Refresh"]');
    if (!button) { reply(true, 'none'); return; }
    for (const type of ['mousedown', 'mouseup', 'click']) {
      button.dispatchEvent(new MouseEvent(type, { bubbles: true }));
    }
    reply(true, 'triggered');"#
        .to_string()
}

fn change_script() -> String {
    format!(
        r#"    const target = document.querySelector('{UNREAD_ROWS}')?.parentElement || document.body;
    const observer = new MutationObserver(() => {{ observer.disconnect(); reply(true, null); }});
    observer.observe(target, {{ childList: true, subtree: true, attributes: true }});"#
    )
}

fn scan_script() -> String {
    format!(
        r#"    let next = Number(document.body.dataset.mailwatchNext || 0);
    const entries = [];
    document.querySelectorAll('{UNREAD_ROWS}').forEach(row => {{
      if (!row.hasAttribute('{ROW_KEY_ATTR}')) {{
        row.setAttribute('{ROW_KEY_ATTR}', String(next++));
      }}
      const withEmail = row.querySelector('{SENDER_WITH_EMAIL}');
      const sender = withEmail?.getAttribute('email') || row.querySelector('{SENDER_TEXT}')?.textContent || null;
      const subject = row.querySelector('{SUBJECT_TEXT}')?.textContent || '';
      entries.push({{ key: row.getAttribute('{ROW_KEY_ATTR}'), sender, subject }});
    }});
    document.body.dataset.mailwatchNext = String(next);
    reply(true, entries);"#
    )
}

fn mark_script(keys: &[String]) -> String {
    let keys = serde_json::to_string(keys).unwrap_or_else(|_| "[]".into());
    format!(
        r#"    for (const key of {keys}) {{
      document.querySelector('[{ROW_KEY_ATTR}="' + key + '"]')?.classList.remove('zE');
    }}
    reply(true, null);"#
    )
}

fn banner_script(from: &str) -> String {
    let text = serde_json::to_string(&format!("Matched email from {from}"))
        .unwrap_or_else(|_| "\"Matched email\"".into());
    format!(
        r#"    let banner = document.getElementById('{BANNER_ID}');
    if (!banner) {{
      banner = document.createElement('div');
      banner.id = '{BANNER_ID}';
      banner.style.cssText = 'position:fixed;top:0;left:0;right:0;z-index:2147483647;padding:12px;background:#d32f2f;color:#fff;font:bold 16px sans-serif;text-align:center;';
      document.body.appendChild(banner);
    }}
    banner.textContent = {text};
    reply(true, null);"#
    )
}

fn silence_script() -> String {
    format!(
        r#"    document.getElementById('{BANNER_ID}')?.remove();
    reply(true, null);"#
    )
}

#[async_trait]
impl<R: Runtime> ObservationSurface for WebviewSurface<R> {
    fn id(&self) -> &str {
        &self.label
    }

    async fn refresh(&self) -> Result<RefreshOutcome, SurfaceError> {
        let value = self.run(&refresh_script(), Some(SCRIPT_REPLY_TIMEOUT)).await?;
        Ok(match value.as_str() {
            Some("triggered") => RefreshOutcome::Triggered,
            _ => RefreshOutcome::NoAffordance,
        })
    }

    async fn wait_for_change(&self) -> Result<(), SurfaceError> {
        self.run(&change_script(), None).await.map(|_| ())
    }

    async fn unprocessed_entries(&self) -> Result<Vec<SurfaceEntry>, SurfaceError> {
        let value = self.run(&scan_script(), Some(SCRIPT_REPLY_TIMEOUT)).await?;
        serde_json::from_value(value).map_err(|err| SurfaceError::Script {
            surface: self.label.clone(),
            reason: format!("malformed scan result: {err}"),
        })
    }

    async fn mark_processed(&self, keys: &[String]) -> Result<(), SurfaceError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.run(&mark_script(keys), Some(SCRIPT_REPLY_TIMEOUT))
            .await
            .map(|_| ())
    }

    async fn present_alert(&self, from: &str) -> Result<(), SurfaceError> {
        self.run(&banner_script(from), Some(SCRIPT_REPLY_TIMEOUT))
            .await
            .map(|_| ())
    }

    async fn silence_alert(&self) -> Result<(), SurfaceError> {
        self.run(&silence_script(), Some(SCRIPT_REPLY_TIMEOUT))
            .await
            .map(|_| ())
    }
}

/// Treats every webview window whose page host contains `host` as a surface.
/// Surfaces are cached per window label so the controller keeps one agent
/// per window across cycles.
pub struct WebviewDirectory<R: Runtime> {
    app: AppHandle<R>,
    host: String,
    bridge: Arc<SurfaceBridge>,
    cache: Mutex<HashMap<String, Arc<WebviewSurface<R>>>>,
}

impl<R: Runtime> WebviewDirectory<R> {
    pub fn new(app: AppHandle<R>, host: impl Into<String>, bridge: Arc<SurfaceBridge>) -> Self {
        Self {
            app,
            host: host.into(),
            bridge,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn is_surface(&self, window: &WebviewWindow<R>) -> bool {
        match window.url() {
            Ok(url) => url
                .host_str()
                .is_some_and(|host| host.contains(self.host.as_str())),
            Err(err) => {
                log_warn!("Could not read URL of window {}: {err}", window.label());
                false
            }
        }
    }
}

#[async_trait]
impl<R: Runtime> SurfaceDirectory for WebviewDirectory<R> {
    async fn surfaces(&self) -> Vec<Arc<dyn ObservationSurface>> {
        let windows = self.app.webview_windows();
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let matching: Vec<(String, WebviewWindow<R>)> = windows
            .into_iter()
            .filter(|(_, window)| self.is_surface(window))
            .collect();

        cache.retain(|label, _| matching.iter().any(|(open, _)| open == label));

        let surfaces: Vec<Arc<dyn ObservationSurface>> = matching
            .into_iter()
            .map(|(label, window)| {
                let surface = cache
                    .entry(label)
                    .or_insert_with(|| {
                        Arc::new(WebviewSurface::new(window, Arc::clone(&self.bridge)))
                    })
                    .clone();
                surface as Arc<dyn ObservationSurface>
            })
            .collect();

        log_debug!("{} surfaces open for host {}", surfaces.len(), self.host);
        surfaces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn bridge_delivers_replies_to_the_waiting_request() {
        let bridge = SurfaceBridge::new();
        let (pending, rx) = bridge.register();

        assert!(bridge.resolve(&pending.id, true, json!(["a"])));
        assert_eq!(rx.await.unwrap(), Ok(json!(["a"])));
    }

    #[tokio::test]
    async fn failed_replies_carry_the_script_error() {
        let bridge = SurfaceBridge::new();
        let (pending, rx) = bridge.register();

        bridge.resolve(&pending.id, false, json!("TypeError: x is null"));
        assert_eq!(rx.await.unwrap(), Err("TypeError: x is null".to_string()));
    }

    #[test]
    fn dropped_requests_are_forgotten() {
        let bridge = SurfaceBridge::new();
        let id = {
            let (pending, _rx) = bridge.register();
            pending.id.clone()
        };

        assert!(!bridge.resolve(&id, true, Value::Null));
        assert!(bridge.pending().is_empty());
    }

    #[test]
    fn scan_script_uses_inbox_selectors() {
        let script = scan_script();
        assert!(script.contains(UNREAD_ROWS));
        assert!(script.contains(SENDER_WITH_EMAIL));
        assert!(script.contains(SUBJECT_TEXT));
    }

    #[test]
    fn banner_text_is_escaped() {
        let script = banner_script("evil\"</script>@x.com");
        assert!(script.contains(r#"Matched email from evil\"</script>@x.com"#));
    }
}
