pub mod engine;
pub mod history;
pub mod production;
pub mod timestamp;
pub mod weather;
pub mod window;

pub use engine::*;
pub use history::*;
pub use production::*;
pub use weather::*;
pub use window::*;
