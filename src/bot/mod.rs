pub mod commands;

use serenity::all::{Context, EventHandler, Message, Ready};
use serenity::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::audio::sequencer::PlayerRegistry;
use crate::config::Config;

/// Estado compartido del bot: configuración y el registro de carriles.
pub struct FilaBot {
    pub config: Arc<Config>,
    pub registry: Arc<PlayerRegistry>,
}

impl FilaBot {
    pub fn new(config: Arc<Config>, registry: Arc<PlayerRegistry>) -> Self {
        Self { config, registry }
    }
}

#[async_trait]
impl EventHandler for FilaBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("✅ {} conectado y listo", ready.user.name);
        info!("⚙️ {}", self.config.summary());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // Mensajes de bots y DMs no llevan comandos
        if msg.author.bot || msg.guild_id.is_none() {
            return;
        }

        let Some(command) = commands::parse(&msg.content, &self.config.command_prefix) else {
            return;
        };

        debug!("comando aceptado: {:?}", command);
        commands::dispatch(&ctx, &msg, command, &self.registry, &self.config).await;
    }
}
