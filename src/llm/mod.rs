//! LLM orchestration: structured extraction (LLM1) and suggestion (LLM2).

pub mod client;
pub mod llm1;
pub mod llm2;

pub use client::{DeterministicLlmClient, LlmClientPort, OpenAiLlmClient};
pub use llm1::{Llm1Response, Llm1Service, Llm1ServiceResult};
pub use llm2::{Llm2Response, Llm2Service, Llm2ServiceResult};
