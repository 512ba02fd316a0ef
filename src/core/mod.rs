pub mod agent;
pub mod breaker;
pub mod embedding;
pub mod lifecycle;
pub mod llm;
pub mod mailer;
pub mod store;
pub mod tools;
