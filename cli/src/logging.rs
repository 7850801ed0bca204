//! Tracing subscriber setup for the `chainlisten` binary.

use anyhow::{anyhow, Context};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chainlisten_core::config::LogConfig;

/// Install the global subscriber. A non-empty `RUST_LOG` replaces the
/// configured levels entirely.
pub fn init_tracing(config: &LogConfig) -> anyhow::Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(env) if !env.trim().is_empty() => EnvFilter::try_new(&env)
            .with_context(|| format!("invalid {} value {env:?}", EnvFilter::DEFAULT_ENV))?,
        _ => build_filter(config)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    installed.map_err(|e| anyhow!("cannot install tracing subscriber: {e}"))
}

fn build_filter(config: &LogConfig) -> anyhow::Result<EnvFilter> {
    config.directives().into_iter().try_fold(EnvFilter::default(), |filter, d| {
        let directive: Directive = d
            .parse()
            .with_context(|| format!("invalid log directive {d:?}"))?;
        Ok(filter.add_directive(directive))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_filter() {
        assert!(build_filter(&LogConfig::default()).is_ok());
    }

    #[test]
    fn bad_component_level_names_directive() {
        let mut config = LogConfig::default();
        config.components.insert("fabric".into(), "loud".into());

        let err = build_filter(&config).unwrap_err();
        assert!(
            err.to_string().contains("chainlisten_fabric=loud"),
            "unexpected error: {err}"
        );
    }
}
