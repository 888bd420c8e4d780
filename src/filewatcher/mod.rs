mod debounce;
mod parser;
mod watcher;

pub use debounce::{Debouncer, WatchPhase};
pub use parser::{parse_config_xml, read_config_file, GuiConfig};
pub use watcher::ConfigFileWatcher;
