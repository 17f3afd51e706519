pub mod app;
pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod run;
pub mod runtime;
pub mod script;
pub mod selectors;

pub use app::run;
pub use selectors::render_reports;
