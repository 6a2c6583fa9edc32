#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use tandem::config::{
    CommandSection, ConfigFile, IdleSection, OptionsSection, ProbeSection, RawConfigFile,
};
use tandem::engine::{self, Runtime, RuntimeOptions, RuntimeReceiver};
use tandem::errors::Result;
use tandem::orchestrator::{Orchestrator, OrchestratorOptions};

use crate::fake_connector::FakeConnector;
use crate::fake_executor::FakeExecutor;
use crate::sink::SharedSink;

/// Orchestrator options suitable for tests: no signal listener.
pub fn test_options() -> OrchestratorOptions {
    OrchestratorOptions {
        handle_signals: false,
        ..OrchestratorOptions::default()
    }
}

/// An orchestrator wired to fakes, plus the receiving end of its channel.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub rx: RuntimeReceiver,
    pub executor: FakeExecutor,
    pub connector: FakeConnector,
    pub sink: SharedSink,
}

impl Harness {
    /// Hand the orchestrator and channel to a `Runtime`.
    pub fn into_runtime(self, options: RuntimeOptions) -> (Runtime, FakeExecutor, SharedSink) {
        let runtime = Runtime::new(self.orchestrator, self.rx, options);
        (runtime, self.executor, self.sink)
    }
}

/// Builder for [`Harness`].
pub struct HarnessBuilder {
    options: OrchestratorOptions,
    executor: FakeExecutor,
    connector: FakeConnector,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            options: test_options(),
            executor: FakeExecutor::new(),
            connector: FakeConnector::refusing(),
        }
    }

    pub fn options(mut self, f: impl FnOnce(&mut OrchestratorOptions)) -> Self {
        f(&mut self.options);
        self
    }

    pub fn executor(mut self, executor: FakeExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn connector(mut self, connector: FakeConnector) -> Self {
        self.connector = connector;
        self
    }

    pub fn build(self) -> Harness {
        let (tx, rx) = engine::channel();
        let sink = SharedSink::new();
        let orchestrator = Orchestrator::new(self.options, tx)
            .expect("valid test options")
            .with_executor(Arc::new(self.executor.clone()))
            .with_connector(Arc::new(self.connector.clone()))
            .with_sink(sink.clone());

        Harness {
            orchestrator,
            rx,
            executor: self.executor,
            connector: self.connector,
            sink,
        }
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `RawConfigFile` to simplify config test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                options: OptionsSection::default(),
                command: Vec::new(),
            },
        }
    }

    pub fn options(mut self, f: impl FnOnce(&mut OptionsSection)) -> Self {
        f(&mut self.config.options);
        self
    }

    pub fn with_command(mut self, command: CommandSection) -> Self {
        self.config.command.push(command);
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `CommandSection`.
pub struct CommandSectionBuilder {
    command: CommandSection,
}

impl CommandSectionBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            command: CommandSection {
                cmd: cmd.to_string(),
                args: vec![],
                name: None,
                cwd: None,
                env: BTreeMap::new(),
                uid: None,
                gid: None,
                color: None,
                muted: false,
                condensed: false,
                delay_ms: 0,
                runnable: true,
                groups: vec![],
                probe: None,
                idle: None,
                track_output: true,
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.command.name = Some(name.to_string());
        self
    }

    pub fn color(mut self, color: &str) -> Self {
        self.command.color = Some(color.to_string());
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.command.groups.push(group.to_string());
        self
    }

    pub fn runnable(mut self, runnable: bool) -> Self {
        self.command.runnable = runnable;
        self
    }

    pub fn probe(mut self, port: u16, attempts: u32, target: Option<&str>) -> Self {
        self.command.probe = Some(ProbeSection {
            host: "127.0.0.1".to_string(),
            port,
            attempts,
            retry_delay_ms: 100,
            target: target.map(str::to_string),
        });
        self
    }

    pub fn idle(mut self, tick_ms: u64, target: Option<&str>) -> Self {
        self.command.idle = Some(IdleSection {
            tick_ms,
            timeout_ms: None,
            target: target.map(str::to_string),
        });
        self
    }

    pub fn build(self) -> CommandSection {
        self.command
    }
}
