//! Log setup for the bridge binary.
//!
//! Every bridge component logs under a fixed target (see [`logging::Component`]),
//! so filters can be tuned per component without knowing module paths.

fn env_truthy(var: &str) -> Option<bool> {
    std::env::var(var).map(|v| v != "0" && !v.is_empty()).ok()
}

pub mod logging {
    use clap::ValueEnum;
    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use std::str::FromStr;
    use std::sync::OnceLock;
    use tracing::level_filters::LevelFilter;
    use tracing_appender::non_blocking::WorkerGuard;
    use tracing_subscriber::EnvFilter;

    /// A complete `EnvFilter` directive string; replaces everything else.
    pub const ENV_LOG_FILTER: &str = "LINKPEEK_LOG_FILTER";
    /// Per-component levels, e.g. `rpc=trace,surface=off`.
    pub const ENV_LOG_COMPONENTS: &str = "LINKPEEK_LOG_COMPONENTS";
    pub const ENV_TRACE_DEPS: &str = "LINKPEEK_TRACE_DEPS";

    const HTTP_DEPS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

    #[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
    pub enum LogLevel {
        Error,
        #[default]
        Warn,
        Info,
        Debug,
        Trace,
    }

    impl LogLevel {
        pub fn as_str(self) -> &'static str {
            match self {
                LogLevel::Error => "error",
                LogLevel::Warn => "warn",
                LogLevel::Info => "info",
                LogLevel::Debug => "debug",
                LogLevel::Trace => "trace",
            }
        }

        fn to_filter(self) -> LevelFilter {
            match self {
                LogLevel::Error => LevelFilter::ERROR,
                LogLevel::Warn => LevelFilter::WARN,
                LogLevel::Info => LevelFilter::INFO,
                LogLevel::Debug => LevelFilter::DEBUG,
                LogLevel::Trace => LevelFilter::TRACE,
            }
        }
    }

    /// The parts of the bridge that log under their own target.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Component {
        Rpc,
        Core,
        Surface,
        Channel,
        RemoteDocs,
    }

    impl Component {
        pub const ALL: [Component; 5] = [
            Component::Rpc,
            Component::Core,
            Component::Surface,
            Component::Channel,
            Component::RemoteDocs,
        ];

        pub fn target(self) -> &'static str {
            match self {
                Component::Rpc => "linkpeek::rpc",
                Component::Core => "linkpeek::core",
                Component::Surface => "linkpeek::surface",
                Component::Channel => "bridge::channel",
                Component::RemoteDocs => "remote_docs",
            }
        }

        pub fn from_name(name: &str) -> Option<Self> {
            match name {
                "rpc" => Some(Component::Rpc),
                "core" => Some(Component::Core),
                "surface" => Some(Component::Surface),
                "channel" => Some(Component::Channel),
                "remote" | "remote_docs" => Some(Component::RemoteDocs),
                _ => None,
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    pub struct LogConfig {
        pub level: LogLevel,
        pub file: Option<PathBuf>,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum InitError {
        #[error("failed to open log file {path:?}: {source}")]
        Io {
            path: PathBuf,
            source: std::io::Error,
        },
        #[error("invalid component level {0:?}; expected <component>=<level>")]
        Directive(String),
        #[error("failed to configure logger: {0}")]
        Configure(String),
    }

    /// Filter directives for the bridge: a floor for everything, the bridge's
    /// own crates at the chosen level, and optional per-component levels.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct BridgeFilter {
        level: LevelFilter,
        components: Vec<(Component, LevelFilter)>,
        quiet_http: bool,
    }

    impl BridgeFilter {
        pub fn new(level: LogLevel) -> Self {
            Self {
                level: level.to_filter(),
                components: Vec::new(),
                quiet_http: false,
            }
        }

        pub fn component(mut self, component: Component, level: LevelFilter) -> Self {
            self.components.retain(|(existing, _)| *existing != component);
            self.components.push((component, level));
            self
        }

        /// Cap HTTP client crates at info when tracing.
        pub fn quiet_http(mut self, quiet: bool) -> Self {
            self.quiet_http = quiet;
            self
        }

        /// Apply `name=level` pairs separated by commas.
        pub fn overrides(mut self, raw: &str) -> Result<Self, InitError> {
            for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let parsed = pair.split_once('=').and_then(|(name, level)| {
                    let component = Component::from_name(name.trim())?;
                    let level = LevelFilter::from_str(level.trim()).ok()?;
                    Some((component, level))
                });
                let Some((component, level)) = parsed else {
                    return Err(InitError::Directive(pair.to_string()));
                };
                self = self.component(component, level);
            }
            Ok(self)
        }

        pub fn directives(&self) -> String {
            let floor = self.level.min(LevelFilter::INFO);
            let mut out = vec![level_str(floor).to_string()];
            if self.level > floor {
                for krate in ["linkpeek", "bridge", "bridge_channel", "remote_docs"] {
                    out.push(format!("{krate}={}", level_str(self.level)));
                }
            }
            for (component, level) in &self.components {
                out.push(format!("{}={}", component.target(), level_str(*level)));
            }
            if self.quiet_http && self.level == LevelFilter::TRACE {
                out.extend(HTTP_DEPS.iter().map(|dep| format!("{dep}=info")));
            }
            out.join(",")
        }
    }

    fn level_str(level: LevelFilter) -> &'static str {
        match level {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            _ => "trace",
        }
    }

    static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    /// Install the global subscriber. Later calls are no-ops.
    pub fn init(config: &LogConfig) -> Result<(), InitError> {
        if GUARD.get().is_some() {
            return Ok(());
        }

        let directives = match std::env::var(ENV_LOG_FILTER) {
            Ok(raw) => raw,
            Err(_) => {
                let allow_deps = super::env_truthy(ENV_TRACE_DEPS).unwrap_or(false);
                let components = std::env::var(ENV_LOG_COMPONENTS).unwrap_or_default();
                BridgeFilter::new(config.level)
                    .quiet_http(!allow_deps)
                    .overrides(&components)?
                    .directives()
            }
        };

        let (writer, guard) = match &config.file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| InitError::Io {
                        path: path.clone(),
                        source,
                    })?;
                tracing_appender::non_blocking(file)
            }
            None => tracing_appender::non_blocking(std::io::stderr()),
        };

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(&directives))
            .with_target(config.level >= LogLevel::Debug)
            .with_ansi(config.file.is_none())
            .with_writer(writer)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| InitError::Configure(err.to_string()))?;

        let _ = GUARD.set(guard);
        tracing::debug!(%directives, "logging initialised");
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use bridge_channel::{Channel, LocalChannel};
        use bytes::Bytes;
        use std::io::Write;
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Captured(Arc<Mutex<Vec<u8>>>);

        impl Write for Captured {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        #[test]
        fn component_filters_match_emitted_events() {
            let captured = Captured::default();
            let directives = BridgeFilter::new(LogLevel::Warn)
                .overrides("channel=debug")
                .unwrap()
                .directives();
            let writer = captured.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new(directives))
                .with_target(true)
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish();

            tracing::subscriber::with_default(subscriber, || {
                let (left, right) = LocalChannel::pair();
                right.close();
                left.send(Bytes::from_static(b"lost")).unwrap();
            });

            let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
            assert!(output.contains("bridge::channel"), "{output}");
            assert!(output.contains("peer gone"), "{output}");
        }

        #[test]
        fn debug_raises_bridge_crates_only() {
            assert_eq!(
                BridgeFilter::new(LogLevel::Debug).directives(),
                "info,linkpeek=debug,bridge=debug,bridge_channel=debug,remote_docs=debug"
            );
            assert_eq!(BridgeFilter::new(LogLevel::Warn).directives(), "warn");
        }

        #[test]
        fn component_levels_use_log_targets() {
            let filter = BridgeFilter::new(LogLevel::Warn)
                .overrides("core=debug, surface=off")
                .unwrap();
            assert_eq!(
                filter.directives(),
                "warn,linkpeek::core=debug,linkpeek::surface=off"
            );

            // A later entry for the same component wins.
            let filter = filter.overrides("core=trace").unwrap();
            assert_eq!(
                filter.directives(),
                "warn,linkpeek::surface=off,linkpeek::core=trace"
            );
        }

        #[test]
        fn unknown_components_are_rejected() {
            let err = BridgeFilter::new(LogLevel::Info)
                .overrides("renderer=debug")
                .unwrap_err();
            assert!(matches!(err, InitError::Directive(pair) if pair == "renderer=debug"));
            assert!(BridgeFilter::new(LogLevel::Info).overrides("rpc").is_err());
        }

        #[test]
        fn http_crates_are_quieted_only_when_tracing() {
            let traced = BridgeFilter::new(LogLevel::Trace).quiet_http(true).directives();
            assert!(traced.starts_with("info,linkpeek=trace"));
            assert!(traced.ends_with("h2=info"));

            let debug = BridgeFilter::new(LogLevel::Debug).quiet_http(true).directives();
            assert!(!debug.contains("reqwest"));
        }

        #[test]
        fn every_component_name_round_trips() {
            for component in Component::ALL {
                let name = component.target().rsplit("::").next().unwrap();
                let name = if name == "remote_docs" { "remote" } else { name };
                assert_eq!(Component::from_name(name), Some(component));
            }
        }
    }
}
