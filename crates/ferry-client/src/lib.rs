pub mod browser_driver;

pub use browser_driver::{ChromeDriver, ChromeSession};
