// Known models on the default backend

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    /// Context window in tokens
    pub context: usize,
    pub thinking: bool,
    pub images: bool,
    pub code: bool,
}

const fn model(id: &'static str, context: usize, thinking: bool, images: bool, code: bool) -> ModelInfo {
    ModelInfo {
        id,
        context,
        thinking,
        images,
        code,
    }
}

pub const MODELS: &[ModelInfo] = &[
    // Text
    model("meta-llama-3.1-8b-instruct", 128_000, false, false, false),
    model("openai-gpt-oss-120b", 128_000, false, false, false),
    model("llama-3.1-sauerkrautlm-70b-instruct", 128_000, false, false, false),
    model("llama-3.3-70b-instruct", 128_000, false, false, false),
    model("gemma-3-27b-it", 128_000, false, true, false),
    model("mistral-large-instruct", 128_000, false, false, false),
    model("qwen3-32b", 32_768, false, false, false),
    model("qwen3-235b-a22b", 32_768, true, false, false),
    // Code
    model("qwen2.5-coder-32b-instruct", 32_768, false, false, true),
    model("qwen3-coder-7b", 32_768, false, false, true),
    model("qwen3-coder-14b", 32_768, false, false, true),
    model("codestral-22b", 32_000, false, false, true),
    // Vision
    model("internvl2.5-8b", 8_192, false, true, false),
    model("qwen2.5-vl-72b-instruct", 32_768, false, true, false),
    // Reasoning
    model("qwq-32b", 32_768, true, false, false),
    model("deepseek-r1", 64_000, true, false, false),
];

pub fn lookup(id: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.id == id)
}
