pub mod http;
pub mod parse;
pub mod retry;
