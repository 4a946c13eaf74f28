//! Lua module for editor-hosted UIs.
//!
//! ```lua
//! local sync = require("accountsync_client")
//! sync.init_logging(vim.json.encode({ dir = vim.fn.stdpath("log") }))
//! local ws = sync.open_workspace(vim.json.encode({ catalog_path = "catalog.json" }))
//! ws:select("003C")
//! ws:pump()
//! local summary = vim.json.decode(ws:summary())
//! ```

use mlua::prelude::*;
use mlua::{UserData, UserDataMethods};
use serde_json::json;
use std::backtrace::Backtrace;
use std::panic;
use std::rc::Rc;
use tokio::runtime::Runtime;
use tracing::error;

use crate::channel::MessageChannel;
use crate::components::{AccountBrowser, SummaryPanel};
use crate::config::SyncConfig;
use crate::event_loop::EventLoop;
use crate::notify::NotificationLog;
use crate::resolver::TreeSelectEvent;
use crate::source::JsonCatalog;

fn parse_config(json: Option<String>) -> LuaResult<SyncConfig> {
    match json {
        Some(raw) if !raw.trim().is_empty() => {
            SyncConfig::from_json_str(&raw).map_err(LuaError::external)
        }
        _ => Ok(SyncConfig::default()),
    }
}

/// Browser, summary panel and the loop they share, driven from Lua.
pub struct Workspace {
    runtime: Runtime,
    event_loop: EventLoop,
    catalog: Rc<JsonCatalog>,
    browser: AccountBrowser,
    summary: SummaryPanel,
    notes: NotificationLog,
}

impl Workspace {
    #[tracing::instrument(skip(config))]
    fn open(config: SyncConfig) -> LuaResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(LuaError::external)?;

        let catalog = match &config.catalog_path {
            Some(path) => JsonCatalog::from_path(path).map_err(LuaError::external)?,
            None => JsonCatalog::default(),
        };
        let catalog = Rc::new(catalog);

        let event_loop = EventLoop::new();
        let channel = MessageChannel::new(&event_loop);
        let notes = NotificationLog::new();

        let mut browser = AccountBrowser::new(channel.clone(), &config, Rc::new(notes.clone()));
        runtime.block_on(browser.load(catalog.as_ref(), catalog.as_ref()));

        let mut summary = SummaryPanel::new(
            channel,
            &event_loop,
            catalog.clone(),
            Rc::new(notes.clone()),
            &config,
        );
        summary.connect();

        Ok(Self {
            runtime,
            event_loop,
            catalog,
            browser,
            summary,
            notes,
        })
    }

    fn pump(&self) {
        self.runtime.block_on(self.event_loop.run_until_idle());
    }

    fn reload(&mut self) {
        let catalog = Rc::clone(&self.catalog);
        self.runtime
            .block_on(self.browser.load(catalog.as_ref(), catalog.as_ref()));
    }

    fn summary_json(&self) -> LuaResult<String> {
        let summary = &self.summary;
        let out = json!({
            "selection": summary.selection(),
            "type_is_contact": summary.type_is_contact(),
            "loading": summary.is_loading(),
            "error": summary.error(),
            "record": summary.projection(),
        });
        serde_json::to_string(&out).map_err(LuaError::external)
    }
}

impl UserData for Workspace {
    fn add_methods<M: UserDataMethods<Self>>(m: &mut M) {
        m.add_method("tree_items", |_, this, ()| {
            serde_json::to_string(this.browser.tree_items()).map_err(LuaError::external)
        });
        m.add_method_mut("select", |_, this, name: String| {
            Ok(this
                .browser
                .handle_tree_select(&TreeSelectEvent::named(name))
                .is_some())
        });
        m.add_method("pump", |_, this, ()| {
            this.pump();
            Ok(())
        });
        m.add_method_mut("reload", |_, this, ()| {
            this.reload();
            Ok(())
        });
        m.add_method("summary", |_, this, ()| this.summary_json());
        m.add_method("notifications", |_, this, ()| {
            serde_json::to_string(&this.notes.drain()).map_err(LuaError::external)
        });
        m.add_method("show_no_accounts", |_, this, ()| {
            Ok(this.browser.show_no_accounts())
        });
        m.add_method_mut("connect", |_, this, ()| {
            this.summary.connect();
            Ok(())
        });
        m.add_method_mut("disconnect", |_, this, ()| {
            this.summary.disconnect();
            Ok(())
        });
    }
}

#[mlua::lua_module(skip_memory_check)]
fn accountsync_client(lua: &Lua) -> LuaResult<LuaTable> {
    let exports = lua.create_table()?;
    exports.set(
        "init_logging",
        lua.create_function(|_, json: Option<String>| {
            let config = parse_config(json)?;
            crate::init_logging(&config.log).map_err(LuaError::external)
        })?,
    )?;

    exports.set(
        "shutdown_logging",
        lua.create_function(|_, ()| {
            crate::shutdown_logging();
            Ok(())
        })?,
    )?;

    let default = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let bt = Backtrace::force_capture();
        error!(target: "panic", "panic: {panic_info}\n\nBacktrace:\n{bt}");
        default(panic_info);
    }));

    exports.set(
        "open_workspace",
        lua.create_function(|_, json: Option<String>| Workspace::open(parse_config(json)?))?,
    )?;

    Ok(exports)
}
