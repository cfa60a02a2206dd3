use crate::poller::VisibilityHandle;
use anyhow::{Context, Result};
use futures_util::StreamExt;
use zbus::proxy;

#[proxy(
    interface = "org.freedesktop.ScreenSaver",
    default_service = "org.freedesktop.ScreenSaver",
    default_path = "/org/freedesktop/ScreenSaver"
)]
trait ScreenSaver {
    fn get_active(&self) -> zbus::Result<bool>;

    #[zbus(signal)]
    fn active_changed(&self, active: bool) -> zbus::Result<()>;
}

/// Follows the session screen saver; an active (locked or blanked) screen
/// counts as hidden.
pub async fn watch() -> Result<VisibilityHandle> {
    let connection = zbus::Connection::session()
        .await
        .context("Failed to connect to session D-Bus")?;

    let proxy = ScreenSaverProxy::new(&connection)
        .await
        .context("Failed to create screen saver proxy")?;

    let active = proxy
        .get_active()
        .await
        .context("Failed to query screen saver state")?;

    let mut changes = proxy
        .receive_active_changed()
        .await
        .context("Failed to subscribe to screen saver changes")?;

    let handle = VisibilityHandle::new(active);
    tracing::info!(hidden = active, "Following screen saver visibility");

    let updates = handle.clone();
    tokio::spawn(async move {
        // Owning the proxy keeps the connection alive for the stream
        let _proxy = proxy;
        while let Some(signal) = changes.next().await {
            match signal.args() {
                Ok(args) => {
                    let active = *args.active();
                    tracing::debug!(active, "Screen saver state changed");
                    updates.set_hidden(active);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed ActiveChanged signal");
                }
            }
        }
        tracing::warn!("Screen saver signal stream ended");
    });

    Ok(handle)
}
