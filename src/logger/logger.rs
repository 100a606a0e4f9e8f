use anyhow::{Result, anyhow};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

/// Installs the global subscriber early with a conservative filter, then
/// lets the configured directive take over once settings are parsed.
pub struct Logger {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl Logger {
    pub fn bootstrap() -> Self {
        let (filter, handle) = reload::Layer::new(EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();

        Self { handle }
    }

    pub fn apply_filter(&self, directive: &str) -> Result<()> {
        let filter = EnvFilter::try_new(directive).map_err(|e| anyhow!(e))?;
        self.handle.reload(filter).map_err(|e| anyhow!(e))?;
        Ok(())
    }
}
