use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use slotbook::config::AppConfig;
use slotbook::db;
use slotbook::handlers;
use slotbook::services::ai::intent::LlmIntentClassifier;
use slotbook::services::ai::keyword::KeywordClassifier;
use slotbook::services::ai::providers::{GroqProvider, OllamaProvider};
use slotbook::services::ai::IntentClassifier;
use slotbook::services::availability::{seed_business_hours, AvailabilityStore};
use slotbook::services::conversation::{ConversationStore, SqliteConversationStore};
use slotbook::services::orchestrator::Orchestrator;
use slotbook::state::AppState;

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    let db = Arc::new(Mutex::new(conn));

    let availability = Arc::new(AvailabilityStore::new(Arc::clone(&db)));
    let conversations: Arc<dyn ConversationStore> =
        Arc::new(SqliteConversationStore::new(Arc::clone(&db)));

    if config.seed_days > 0 {
        seed_business_hours(
            &availability,
            Utc::now().date_naive(),
            config.seed_days,
            config.business_open_hour,
            config.business_close_hour,
            config.slot_minutes,
        )?;
    }

    let classifier: Box<dyn IntentClassifier> = match config.llm_provider.as_str() {
        "groq" => {
            anyhow::ensure!(
                !config.groq_api_key.is_empty(),
                "GROQ_API_KEY must be set when LLM_PROVIDER=groq"
            );
            tracing::info!("using Groq intent classifier (model: {})", config.groq_model);
            Box::new(LlmIntentClassifier::new(Box::new(GroqProvider::new(
                config.groq_api_key.clone(),
                config.groq_model.clone(),
            ))))
        }
        "ollama" => {
            tracing::info!("using Ollama intent classifier (url: {})", config.ollama_url);
            Box::new(LlmIntentClassifier::new(Box::new(OllamaProvider::new(
                config.ollama_url.clone(),
                config.ollama_model.clone(),
            ))))
        }
        _ => {
            tracing::info!("using keyword intent classifier");
            Box::new(KeywordClassifier::new(
                config.business_open_hour,
                config.business_close_hour,
            ))
        }
    };

    let orchestrator = Orchestrator::new(
        Arc::clone(&availability),
        Arc::clone(&conversations),
        classifier,
        config.max_slots_shown,
    );

    spawn_housekeeping(&config, Arc::clone(&availability), Arc::clone(&conversations));

    let state = Arc::new(AppState {
        config: config.clone(),
        availability,
        conversations,
        orchestrator,
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/chat", post(handlers::chat::chat))
        .route("/conversations/:id", get(handlers::chat::get_conversation))
        .route(
            "/slots",
            get(handlers::slots::list_available).post(handlers::slots::create_slot),
        )
        .route("/appointments", get(handlers::appointments::list_appointments))
        .route(
            "/appointments/:id",
            delete(handlers::appointments::cancel_appointment),
        )
        .route(
            "/calendar/:appointment_id",
            get(handlers::calendar::download_ics),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Hold expiry and conversation retention. Both are host policy; the
/// dialog engine itself never times anything out.
fn spawn_housekeeping(
    config: &AppConfig,
    availability: Arc<AvailabilityStore>,
    conversations: Arc<dyn ConversationStore>,
) {
    let hold_ttl = config.hold_ttl_minutes.map(chrono::Duration::minutes);
    let retention = chrono::Duration::minutes(config.conversation_retention_minutes);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        loop {
            ticker.tick().await;
            let now = Utc::now().naive_utc();

            if let Some(ttl) = hold_ttl {
                if let Err(e) = availability.release_expired_holds(&(now - ttl)) {
                    tracing::error!(error = %e, "failed to release expired holds");
                }
            }

            match conversations.purge_finished(&(now - retention)) {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "purged finished conversations"),
                Err(e) => tracing::error!(error = %e, "failed to purge conversations"),
            }
        }
    });
}
