//! Browser launch.

/// Open `url` in the default browser, or in `browser` when given.
///
/// Runs on the blocking pool: console browsers keep the launcher busy until
/// they exit. Failures are logged and never stop the proxy.
pub fn launch(url: String, browser: Option<String>) {
    tokio::task::spawn_blocking(move || {
        tracing::debug!(%url, browser = browser.as_deref().unwrap_or("default"), "opening browser");
        let result = match &browser {
            Some(app) => open::with(&url, app.as_str()),
            None => open::that(&url),
        };
        if let Err(e) = result {
            tracing::error!(%url, "failed to start browser: {e}");
        }
    });
}
