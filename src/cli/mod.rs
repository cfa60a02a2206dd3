pub mod delete;
pub mod download;
pub mod list;
pub mod retry;
pub mod show;
pub mod submit;

mod follow;
mod render;
