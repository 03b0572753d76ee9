pub mod client;
pub mod gateway;
pub mod models;
pub mod parse;
pub mod prompts;

pub use client::{
    CompletionOracle, Generation, OpenRouterOracle, OracleFuture, PermanentOracleError,
};
pub use gateway::{CompletionGateway, CompletionOutcome, RetryPolicy};
pub use models::{Model, Usage};
pub use parse::unwrap_code_fence;
