//! Entry point for the outer layers: listeners come and go through
//! [`Station::subscribe`], operators drive the pipeline through
//! [`Station::handle_command`].

use crate::{
    broadcaster::Broadcaster,
    commands::{self, Command},
    config::Config,
    controller::{PipelineState, SpliceController},
    error::CommandResult,
    mixer::{AudioMixer, SoxMixer},
    probe::{BitrateProbe, SoxProbe},
    registry::{Listener, SubscriberId, SubscriberRegistry},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Station {
    config: Arc<Config>,
    registry: SubscriberRegistry,
    controller: SpliceController,
}

impl Station {
    pub fn new(config: Config, probe: Arc<dyn BitrateProbe>, mixer: Arc<dyn AudioMixer>) -> Self {
        let config = Arc::new(config);
        let registry = SubscriberRegistry::new();
        let broadcaster = Broadcaster::new(registry.clone());
        let controller = SpliceController::new(config.clone(), broadcaster, probe, mixer);

        Station {
            config,
            registry,
            controller,
        }
    }

    /// Station backed by the sox binary for probing and mixing.
    pub fn from_config(config: Config) -> Self {
        let probe = SoxProbe::new(config.sox.sox_path.clone(), config.stream.fallback_bitrate);
        let mixer = SoxMixer::new(&config.sox);

        Self::new(config, Arc::new(probe), Arc::new(mixer))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn controller(&self) -> &SpliceController {
        &self.controller
    }

    pub fn state(&self) -> PipelineState {
        self.controller.state()
    }

    pub fn subscribe(&self) -> Listener {
        let listener = self.registry.subscribe();
        info!("Listener {} connected", listener.id());
        listener
    }

    pub fn unsubscribe(&self, id: &SubscriberId) {
        if self.registry.remove(id) {
            info!("Closing connection of {id}");
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    pub async fn handle_command(&self, input: &str) -> CommandResult {
        info!("Command received: {}", input.trim());

        match Command::parse(input)? {
            Command::Start => self.controller.start().await,
            Command::Stop => self.controller.stop().await,
            Command::Effect(name) => {
                let effect = commands::resolve_effect(&self.config.stream.fx_directory, &name).await?;
                self.controller.splice_effect(&effect).await
            }
        }
    }
}
