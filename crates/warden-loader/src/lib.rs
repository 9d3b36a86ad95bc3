//! Plugin discovery and loading for Warden.
//!
//! Plugins live in one directory each, under one of two roots:
//!
//! ```text
//! <installed_root>/
//! ├── warden-plugin-github/
//! │   ├── plugin.json       # manifest
//! │   └── index.wasm        # entry point
//! └── @warden/
//!     └── plugin-slack/
//!         ├── plugin.json
//!         └── dist/handler.wasm
//! ```
//!
//! The external root has the same layout and is only consulted in
//! production. Every path built from plugin-declared data is checked against
//! the directory it must stay inside, at each hop, before it is touched.
//!
//! # Examples
//!
//! ```no_run
//! use warden_core::WardenConfig;
//! use warden_loader::{LoaderConfig, PluginLoader};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let loader = PluginLoader::new(LoaderConfig::from(&WardenConfig::default()))?;
//! let plugin = loader.load_plugin("warden-plugin-github")?;
//! println!("{} ({})", plugin.manifest.display_name, plugin.module.checksum);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod checksum;
mod discovery;
mod loader;
mod manifest;
mod module;

pub use loader::{LoaderConfig, PluginLoader, PluginSource};
pub use manifest::{
    DEFAULT_ENTRY_POINT, DEFAULT_HOOK_PRIORITY, MANIFEST_FILE, PluginManifest, load_manifest,
};
pub use module::{LoadedPlugin, PluginModule, resolve_entry_point};
