//! The two UI components kept in sync through the message channel.
//!
//! ```text
//!  AccountBrowser ── publish(Selection) ──▶ MessageChannel ──▶ SummaryPanel
//!   TreeIndex                                (EventLoop turn)    SelectionGate
//!   resolve()                                                    fetch ▶ project()
//! ```

mod browser;
mod summary;

pub use browser::AccountBrowser;
pub use summary::SummaryPanel;
