mod screensaver;

use crate::core::settings::VisibilitySource;
use crate::poller::{AlwaysVisible, Visibility};
use std::sync::Arc;

/// Resolves the configured visibility source, falling back to a surface that
/// is always visible when the desktop signal is unavailable.
pub async fn visibility(source: VisibilitySource) -> Arc<dyn Visibility> {
    match source {
        VisibilitySource::Always => Arc::new(AlwaysVisible::new()),
        VisibilitySource::Screensaver => match screensaver::watch().await {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                tracing::warn!(
                    error = %format!("{e:#}"),
                    "Screen saver state unavailable, polling as if always visible"
                );
                Arc::new(AlwaysVisible::new())
            }
        },
    }
}
