use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;

use murmur::config::{self, AppConfig, CREDENTIALS_PATH};
use murmur::core::session::SessionRegistry;
use murmur::core::stt::create_transcriber;
use murmur::core::tts::create_synthesizer;
use murmur::init;
use murmur::settings::SettingsStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Handle CLI commands
    let mut args = env::args();
    let _ = args.next();
    if let Some(command) = args.next() {
        match command.as_str() {
            "init" => {
                if let Some(extra) = args.next() {
                    anyhow::bail!("Unexpected argument '{extra}' after 'init'");
                }
                init::run().await?;
                return Ok(());
            }
            other => {
                anyhow::bail!("Unknown command '{other}'. Supported commands: init");
            }
        }
    }

    // Load configuration, prompting for the credential on first run.
    let mut config = AppConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;
    if config.assemblyai_api_key.is_none() {
        let key = config::load_or_prompt_credentials(Path::new(CREDENTIALS_PATH))
            .map_err(|e| anyhow!(e.to_string()))?;
        config.assemblyai_api_key = Some(key);
    }

    // Verify both backends construct from this configuration before
    // declaring readiness.
    let session_config = config.session_config();
    create_transcriber(session_config.default_backend, &session_config.stt)
        .map_err(|e| anyhow!(e.to_string()))?;
    create_synthesizer(&session_config.tts).map_err(|e| anyhow!(e.to_string()))?;

    let settings =
        Arc::new(SettingsStore::load(config.settings_path.clone()).map_err(|e| anyhow!(e.to_string()))?);
    let registry = SessionRegistry::new(session_config, settings);

    println!(
        "murmur is configured: {} backend, silence threshold {} ms, settings at {:?}.",
        config.default_backend, config.silence_threshold_ms, config.settings_path
    );
    println!(
        "Active sessions: {}. Wire a voice gateway to `SessionRegistry::join` to serve a call.",
        registry.active_calls().len()
    );

    Ok(())
}
