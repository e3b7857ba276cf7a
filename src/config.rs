use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub calendar_name: String,
    pub llm_provider: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub groq_api_key: String,
    pub groq_model: String,
    pub max_slots_shown: usize,
    pub seed_days: u32,
    pub business_open_hour: u32,
    pub business_close_hour: u32,
    pub slot_minutes: i64,
    pub hold_ttl_minutes: Option<i64>,
    pub conversation_retention_minutes: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parsed("PORT").unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "slotbook.db".to_string()),
            calendar_name: env::var("CALENDAR_NAME").unwrap_or_else(|_| "Slotbook".to_string()),
            llm_provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "keyword".to_string()),
            ollama_url: env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
            groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
            groq_model: env::var("GROQ_MODEL")
                .unwrap_or_else(|_| "llama-3.1-8b-instant".to_string()),
            max_slots_shown: parsed("MAX_SLOTS_SHOWN").unwrap_or(10),
            seed_days: parsed("SEED_DAYS").unwrap_or(5),
            business_open_hour: parsed("BUSINESS_OPEN_HOUR").unwrap_or(9),
            business_close_hour: parsed("BUSINESS_CLOSE_HOUR").unwrap_or(17),
            slot_minutes: parsed("SLOT_MINUTES").unwrap_or(60),
            hold_ttl_minutes: parsed("HOLD_TTL_MINUTES"),
            conversation_retention_minutes: parsed("CONVERSATION_RETENTION_MINUTES").unwrap_or(30),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: ":memory:".to_string(),
            calendar_name: "Slotbook".to_string(),
            llm_provider: "keyword".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2".to_string(),
            groq_api_key: String::new(),
            groq_model: "llama-3.1-8b-instant".to_string(),
            max_slots_shown: 10,
            seed_days: 5,
            business_open_hour: 9,
            business_close_hour: 17,
            slot_minutes: 60,
            hold_ttl_minutes: None,
            conversation_retention_minutes: 30,
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
