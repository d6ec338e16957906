// Hosted language model integration

pub mod gemini;

use anyhow::Result;

pub use gemini::GeminiClient;

/// Single-turn text generation steered by a system instruction
pub trait TextGenerator: Send + Sync {
    fn generate(&self, system_instruction: &str, prompt: &str) -> Result<String>;
}
