pub mod activity;
pub mod agenda;
pub mod chat;
pub mod credential;
pub mod portfolio;
pub mod summary;
