mod prompts;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use sentrybot_config::AppConfig;
use sentrybot_context::ContextAssembler;
use sentrybot_episodes::EpisodeEngine;
use sentrybot_ingest::IngestPipeline;
use sentrybot_limits::{build_limiter, ThrottleNoticeSuppressor};
use sentrybot_llm::{ChatMessage, Gateway, HttpGateway, ToolCallback};
use sentrybot_memory::MemoryManager;
use sentrybot_orchestrator::Orchestrator;
use sentrybot_selflearn::SelfLearnEngine;
use sentrybot_store::Store;
use sentrybot_telegram::{commands::CommandContext, TelegramBot};
use sentrybot_tools::{
    CalculatorTool, CurrencyTool, ForgetMemoryTool, ImageGenerationTool, PollsTool,
    RecallMemoriesTool, RememberMemoryTool, SetPronounsTool, ToolRegistry, WeatherTool,
    WebSearchTool,
};

const CONFIG_PATH: &str = "config/default.toml";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load_from(CONFIG_PATH).context("loading config")?;
    if config.auth.telegram_bot_token.is_empty() {
        bail!("TELEGRAM_BOT_TOKEN is not set; export it or add it to config/default.toml");
    }
    if config.auth.gemini_api_keys.is_empty() {
        bail!("GEMINI_API_KEYS is not set; export at least one key");
    }

    let store = Store::connect(&config.operational.database_url)
        .await
        .context("connecting to store")?;

    let gateway: Arc<dyn Gateway> = Arc::new(HttpGateway::new(
        config.auth.gemini_api_keys.clone(),
        config.model.generation_model.clone(),
        config.model.embedding_model.clone(),
        Duration::from_secs(config.model.generation_timeout_secs),
        config.operational.circuit_breaker_failure_threshold,
        Duration::from_secs(config.operational.circuit_breaker_cooldown_secs),
    ));

    let embed_fn: sentrybot_memory::EmbedFn = {
        let gateway = gateway.clone();
        Arc::new(move |text: String| {
            let gateway = gateway.clone();
            Box::pin(async move { gateway.embed(&text).await.ok() })
        })
    };

    let memory = MemoryManager::new(store.clone(), config.profiles.dedup_threshold, Some(embed_fn));

    let episode_embed_fn: sentrybot_episodes::EmbedFn = {
        let gateway = gateway.clone();
        Arc::new(move |text: String| {
            let gateway = gateway.clone();
            Box::pin(async move { gateway.embed(&text).await.ok() })
        })
    };
    let episode_summarize_fn: sentrybot_episodes::SummarizeFn = {
        let gateway = gateway.clone();
        Arc::new(move |texts: Vec<String>| {
            let gateway = gateway.clone();
            Box::pin(async move {
                let prompt = prompts::episode_summary_prompt(&texts);
                let result = generate_plain_text(&gateway, &prompt).await?;
                prompts::parse_episode_summary(&result)
            })
        })
    };

    let episodes = Arc::new(EpisodeEngine::new(
        store.clone(),
        Some(episode_summarize_fn),
        Some(episode_embed_fn),
    ));

    let insight_fn: sentrybot_selflearn::InsightFn = {
        let gateway = gateway.clone();
        Arc::new(move |prompt: String| {
            let gateway = gateway.clone();
            Box::pin(async move { generate_plain_text(&gateway, &prompt).await })
        })
    };
    let selflearn = Arc::new(SelfLearnEngine::new(
        store.clone(),
        memory.clone(),
        config.selflearn.clone(),
        Some(insight_fn),
    ));

    let profile_summarize_fn: sentrybot_memory::SummarizeFn = {
        let store = store.clone();
        let gateway = gateway.clone();
        Arc::new(move |user_id: i64, chat_id: i64| {
            let store = store.clone();
            let gateway = gateway.clone();
            Box::pin(async move {
                let history = store.messages().recent(chat_id, None, 30).await.ok()?;
                let texts: Vec<String> = history
                    .into_iter()
                    .filter(|m| m.user_id == Some(user_id))
                    .filter_map(|m| m.text)
                    .collect();
                if texts.is_empty() {
                    return None;
                }
                let prompt = prompts::profile_summary_prompt(&texts);
                generate_plain_text(&gateway, &prompt).await
            })
        })
    };

    let context = ContextAssembler::new(store.clone(), memory.clone(), config.context.clone());
    let ingest = IngestPipeline::new(&config.ingest);

    let limiter = Arc::new(build_limiter(store.clone(), &config).await);
    let throttle = ThrottleNoticeSuppressor::new(store.clone(), config.limits.suppression_cooldown_seconds as i64);

    let mut tools = ToolRegistry::default();
    tools.register(Box::new(RememberMemoryTool::new(memory.clone())));
    tools.register(Box::new(RecallMemoriesTool::new(memory.clone())));
    tools.register(Box::new(ForgetMemoryTool::new(memory.clone())));
    tools.register(Box::new(SetPronounsTool::new(memory.clone())));
    tools.register(Box::new(WeatherTool));
    tools.register(Box::new(CurrencyTool));
    tools.register(Box::new(CalculatorTool));
    tools.register(Box::new(WebSearchTool));
    tools.register(Box::new(ImageGenerationTool));
    tools.register(Box::new(PollsTool));
    let tools = Arc::new(tools);

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        memory.clone(),
        context,
        episodes.clone(),
        selflearn.clone(),
        ingest,
        limiter,
        throttle,
        gateway,
        tools,
        config.clone(),
    ));

    let commands = Arc::new(CommandContext {
        store: store.clone(),
        memory: memory.clone(),
        selflearn: selflearn.clone(),
        config: config.clone(),
        confirmations: Default::default(),
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    sentrybot_episodes::monitor::spawn_monitor(episodes, config.episodes.clone(), shutdown_rx.clone());

    let summarizer = sentrybot_memory::ProfileSummarizer::new(
        store.clone(),
        profile_summarize_fn,
        Duration::from_secs(config.profiles.summary_stale_hours * 3600),
        50,
    );
    summarizer.spawn(Duration::from_secs(300), shutdown_rx.clone());

    let bot = TelegramBot::new(config.auth.telegram_bot_token.clone(), orchestrator, commands, config.clone());

    let run_result = bot.run().await;

    let _ = shutdown_tx.send(true);
    run_result
}

/// Single-shot, no-tools generation used by the background summarize/insight
/// closures, which never need the orchestrator's tool-calling loop.
async fn generate_plain_text(gateway: &Arc<dyn Gateway>, prompt: &str) -> Option<String> {
    let messages = vec![ChatMessage::user(prompt)];
    let no_tools: &ToolCallback<'_> = &|_name, _args| Box::pin(async { String::new() });
    match gateway.generate(messages, &[], no_tools, 0).await {
        Ok(result) => Some(result.content),
        Err(err) => {
            tracing::warn!(error = %err, "background generation failed");
            None
        }
    }
}
