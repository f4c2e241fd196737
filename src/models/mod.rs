pub mod dead_letter;
pub mod headers;
pub mod health;
pub mod message;
pub mod retry;
pub mod status;
pub mod validation;
