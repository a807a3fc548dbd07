pub mod config;
pub mod list;
pub mod relay;
pub mod relay_all;

pub use config::ConfigCommand;
pub use list::ListCommand;
pub use relay::RelayCommand;
pub use relay_all::RelayAllCommand;
