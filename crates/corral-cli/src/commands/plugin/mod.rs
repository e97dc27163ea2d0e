//! Plugin management commands.

pub(crate) mod create;
pub(crate) mod inspect;
pub(crate) mod install;
pub(crate) mod list;
pub(crate) mod state;
pub(crate) mod uninstall;
pub(crate) mod verify;

pub(crate) use create::create_plugin;
pub(crate) use inspect::inspect_plugin;
pub(crate) use install::install_plugin;
pub(crate) use list::list_plugins;
pub(crate) use state::set_plugin_enabled;
pub(crate) use uninstall::uninstall_plugin;
pub(crate) use verify::verify_plugins;
