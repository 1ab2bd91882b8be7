pub mod openai;
pub mod retry;
