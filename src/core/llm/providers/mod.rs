mod openai;

pub use openai::{OpenAiEmbedder, OpenAiProvider};
