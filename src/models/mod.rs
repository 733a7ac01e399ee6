pub mod analytics;
pub mod category;
pub mod comment;
pub mod post;
pub mod settings;
pub mod tag;
pub mod user;
