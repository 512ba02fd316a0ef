pub mod chat;
pub mod documents;
pub mod health;
pub mod jobs;
pub mod tokens;
