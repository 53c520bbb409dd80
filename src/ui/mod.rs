pub mod app;
pub mod terminal;

pub use app::App;
pub use terminal::TerminalUI;
