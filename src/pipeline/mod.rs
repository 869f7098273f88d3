pub mod lenient;
pub mod llm; // LanguageModel trait, Ollama client, response cache
pub mod enhancement; // Classify → normalize → temporal → facts → summary → metrics
pub mod facts; // LLM-backed fact extraction + validation
